//! Refresh grant with bounded retries.
//!
//! Transient failures (timeouts, 429, 5xx, network errors) are retried with exponential backoff,
//! honoring a provider `Retry-After` hint when one is present. Anything else, or the last
//! transient failure, surfaces as [`Error::RefreshFailed`]. A response without a new refresh
//! token keeps the previous one.

mod metrics;

pub use metrics::{RefreshCounts, RefreshMetrics};

// self
use crate::{
	_prelude::*,
	auth::TokenSet,
	flows::{Broker, TokenClient, common},
	http::ProviderHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderConfig,
};

/// Bounded exponential backoff for transient refresh failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, including the first; values below one behave as one.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub initial_backoff: Duration,
	/// Upper bound for any single delay, including `Retry-After` hints.
	pub max_backoff: Duration,
}
impl RetryPolicy {
	/// Default number of attempts.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
	/// Default first backoff.
	pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::milliseconds(200);
	/// Default backoff ceiling.
	pub const DEFAULT_MAX_BACKOFF: Duration = Duration::seconds(5);

	/// Policy that never retries.
	pub fn no_retry() -> Self {
		Self { max_attempts: 1, ..Self::default() }
	}

	/// Delay before retrying after the given (1-based) failed attempt.
	pub fn backoff_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
		let ceiling = self.max_backoff.max(Duration::ZERO);
		let delay = match hint {
			Some(hint) => hint,
			None => self
				.initial_backoff
				.saturating_mul(2_i32.saturating_pow(attempt.saturating_sub(1))),
		};

		delay.clamp(Duration::ZERO, ceiling)
	}

	fn attempts(&self) -> u32 {
		self.max_attempts.max(1)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
			initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
			max_backoff: Self::DEFAULT_MAX_BACKOFF,
		}
	}
}

impl<C, M> TokenClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Runs the refresh grant for `tokens`, retrying transient failures.
	pub async fn refresh_tokens(
		&self,
		config: &ProviderConfig,
		tokens: &TokenSet,
	) -> Result<TokenSet> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_tokens").with_provider(&config.id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span.in_span(self.refresh_with_retry(config, tokens)).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		common::finish(KIND, result)
	}

	async fn refresh_with_retry(
		&self,
		config: &ProviderConfig,
		tokens: &TokenSet,
	) -> Result<TokenSet> {
		let facade = self.facade(config)?;
		let strategy = self.registry.strategy(&config.id);
		let attempts = self.retry.attempts();
		let mut attempt = 1;

		loop {
			match facade.refresh_token(strategy.as_ref(), tokens).await {
				Ok(refreshed) => return Ok(refreshed),
				Err(err) if err.is_transient() && attempt < attempts => {
					let delay = self.retry.backoff_for(attempt, err.retry_after());

					tracing::debug!(
						provider = %config.id,
						attempt,
						delay_ms = delay.whole_milliseconds() as u64,
						error = %err,
						"Transient refresh failure; retrying."
					);
					tokio::time::sleep(delay.unsigned_abs()).await;

					attempt += 1;
				},
				Err(err) => {
					tracing::warn!(provider = %config.id, attempt, error = %err, "Refresh failed.");

					return Err(Error::RefreshFailed(err));
				},
			}
		}
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refreshes a token set for an enabled provider.
	///
	/// Sessions refresh themselves on validation; this is for callers holding tokens directly.
	pub async fn refresh(&self, provider: &str, tokens: &TokenSet) -> Result<TokenSet> {
		let config = self.registry.resolve(provider)?;

		self.token_client.refresh_tokens(&config, tokens).await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = RetryPolicy {
			max_attempts: 5,
			initial_backoff: Duration::milliseconds(100),
			max_backoff: Duration::milliseconds(350),
		};

		assert_eq!(policy.backoff_for(1, None), Duration::milliseconds(100));
		assert_eq!(policy.backoff_for(2, None), Duration::milliseconds(200));
		assert_eq!(policy.backoff_for(3, None), Duration::milliseconds(350));
		assert_eq!(policy.backoff_for(40, None), Duration::milliseconds(350));
	}

	#[test]
	fn retry_after_hint_wins_but_is_capped() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.backoff_for(1, Some(Duration::seconds(2))), Duration::seconds(2));
		assert_eq!(policy.backoff_for(1, Some(Duration::minutes(5))), Duration::seconds(5));
	}

	#[test]
	fn zero_attempts_still_runs_once() {
		let policy = RetryPolicy { max_attempts: 0, ..RetryPolicy::default() };

		assert_eq!(policy.attempts(), 1);
		assert_eq!(RetryPolicy::no_retry().attempts(), 1);
	}
}
