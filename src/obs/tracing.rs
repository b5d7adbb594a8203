// crates.io
use tracing::{Instrument, Span, field, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::FlowKind};

/// Future wrapped in a flow span.
pub type InstrumentedFlow<F> = Instrumented<F>;

/// `oauth2_session.flow` span shared by every flow.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: Span,
}
impl FlowSpan {
	/// Opens a span tagged with the flow kind and call site; `provider` starts empty.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		Self {
			span: tracing::info_span!(
				"oauth2_session.flow",
				flow = kind.as_str(),
				stage,
				provider = field::Empty
			),
		}
	}

	/// Records the provider the flow talks to.
	pub fn with_provider(self, provider: &str) -> Self {
		self.span.record("provider", provider);

		self
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn in_span<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}
