//! Cookie-facing session operations and the expired-record sweep.

// self
use crate::{
	_prelude::*,
	flows::{Broker, common},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	profile::UserIdentity,
	session::SessionId,
	store::StateStore,
};

/// Counts removed by [`Broker::sweep_expired`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Expired sessions removed.
	pub sessions: usize,
	/// Expired authorization states removed.
	pub states: usize,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Resolves the identity behind a session cookie value.
	///
	/// Missing or malformed values fail with [`Error::SessionNotFound`].
	pub async fn current_session(&self, cookie: Option<&str>) -> Result<UserIdentity> {
		let id = cookie.and_then(SessionId::parse).ok_or(Error::SessionNotFound)?;

		self.sessions.validate(&id).await
	}

	/// Destroys the session behind a cookie value; always succeeds for absent sessions.
	pub async fn sign_out(&self, cookie: Option<&str>) -> Result<()> {
		match cookie.and_then(SessionId::parse) {
			Some(id) => self.sessions.destroy(&id).await,
			None => Ok(()),
		}
	}

	/// Removes expired sessions and authorization states.
	pub async fn sweep_expired(&self) -> Result<SweepReport> {
		const KIND: FlowKind = FlowKind::Sweep;

		let span = FlowSpan::new(KIND, "sweep_expired");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.in_span(async move {
				let now = OffsetDateTime::now_utc();
				let sessions = self.sessions.purge_expired(now).await?;
				let states = <dyn StateStore>::purge_states(self.states.as_ref(), now).await?;

				if sessions + states > 0 {
					tracing::debug!(sessions, states, "Expired records swept.");
				}

				Ok(SweepReport { sessions, states })
			})
			.await;

		common::finish(KIND, result)
	}
}
