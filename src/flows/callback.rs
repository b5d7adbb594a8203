//! Callback handling: state consumption, code exchange, profile mapping, session issuance.
//!
//! The origin check runs before anything else and the state is consumed before any provider
//! call, so forged or replayed callbacks never reach the token endpoint.

// self
use crate::{
	_prelude::*,
	auth::TokenSet,
	flows::{AuthorizationState, Broker, common},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	profile::{self, UpsertOutcome, UserIdentity},
	session::{Session, SessionCookie},
	store::{IdentityStore, StateStore},
};

/// Result of a completed sign-in.
#[derive(Clone, Debug)]
pub struct SignInOutcome {
	/// Newly issued session.
	pub session: Session,
	/// Cookie-ready session handle.
	pub cookie: SessionCookie,
	/// Identity the session belongs to.
	pub identity: UserIdentity,
	/// Whether the identity was created or updated.
	pub upsert: UpsertOutcome,
	/// Validated post-login redirect target captured at sign-in.
	pub redirect_to: String,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Consumes `state` for `provider` and exchanges `code` for tokens.
	///
	/// Fails with [`Error::InvalidState`] when the state is unknown, already used, expired, or
	/// was issued for another provider. The code is sent at most once.
	pub async fn exchange_code(
		&self,
		provider: &str,
		code: &str,
		state: &str,
	) -> Result<TokenSet> {
		let pending = self.consume_state(state, Some(provider)).await?;
		let config = self.registry.resolve(&pending.provider)?;

		self.token_client.exchange_code(&config, code, pending.code_verifier.as_ref()).await
	}

	/// Finishes a sign-in from the provider's redirect.
	pub async fn complete_sign_in(
		&self,
		origin: Option<&str>,
		code: &str,
		state: &str,
	) -> Result<SignInOutcome> {
		const KIND: FlowKind = FlowKind::Callback;

		let span = FlowSpan::new(KIND, "complete_sign_in");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.in_span(async move {
				self.origins.check(origin)?;

				let pending = self.consume_state(state, None).await?;
				let config = self.registry.resolve(&pending.provider)?;
				let tokens = self
					.token_client
					.exchange_code(&config, code, pending.code_verifier.as_ref())
					.await?;
				let raw = self.token_client.fetch_user_info(&config, &tokens).await?;
				let identity = profile::map_profile(&config.id, &config.profile, raw)?;
				let upsert =
					<dyn IdentityStore>::upsert(self.identities.as_ref(), identity.clone()).await?;

				tracing::info!(
					provider = %identity.provider,
					provider_user_id = %identity.provider_user_id,
					?upsert,
					"Identity upserted."
				);

				let (session, cookie) = self.sessions.create(&identity, tokens).await?;

				Ok(SignInOutcome {
					session,
					cookie,
					identity,
					upsert,
					redirect_to: pending.redirect_target,
				})
			})
			.await;

		common::finish(KIND, result)
	}

	async fn consume_state(
		&self,
		state: &str,
		expected_provider: Option<&str>,
	) -> Result<AuthorizationState> {
		let now = OffsetDateTime::now_utc();
		let Some(pending) = <dyn StateStore>::consume_state(self.states.as_ref(), state).await?
		else {
			return Err(reject_state(expected_provider, "unknown or already used"));
		};

		if pending.is_expired_at(now) {
			return Err(reject_state(Some(pending.provider.as_ref()), "expired"));
		}
		if expected_provider.is_some_and(|provider| provider != pending.provider.as_ref()) {
			return Err(reject_state(Some(pending.provider.as_ref()), "bound to another provider"));
		}

		Ok(pending)
	}
}

fn reject_state(provider: Option<&str>, reason: &'static str) -> Error {
	tracing::warn!(
		provider = provider.unwrap_or("<unknown>"),
		reason,
		"Authorization state rejected."
	);

	Error::InvalidState { reason }
}
