//! Authorization URL construction and single-use authorization state.
//!
//! [`Broker::begin_authorization`] validates the provider, generates a random `state` (and a PKCE
//! pair when the provider requires one), persists an [`AuthorizationState`] with the configured
//! TTL, and returns the consent URL. Query parameters keep a fixed order (`client_id`,
//! `redirect_uri`, `response_type`, `scope`, `state`, PKCE, then the provider's extras) and
//! every value is percent-encoded, so a space inside `scope` becomes `%20`.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, Secret},
	flows::{Broker, common},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderConfig,
	store::StateStore,
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;
const PKCE_METHOD: &str = "S256";

/// Pending sign-in persisted between the redirect to the provider and the callback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizationState {
	/// Opaque random value round-tripped through the provider.
	pub state: String,
	/// Provider the sign-in was started for.
	pub provider: ProviderId,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Instant after which the callback is rejected.
	pub expires_at: OffsetDateTime,
	/// PKCE verifier, present when the provider requires PKCE.
	pub code_verifier: Option<Secret>,
	/// Validated post-login redirect target.
	pub redirect_target: String,
}
impl AuthorizationState {
	/// Returns `true` once the state is at or past its expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}

/// Consent redirect handed back to the caller.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Provider the request targets.
	pub provider: ProviderId,
	/// Fully-formed consent URL.
	pub url: Url,
	/// State value persisted for the callback.
	pub state: String,
	/// Instant after which the callback will be rejected.
	pub expires_at: OffsetDateTime,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a sign-in for `provider`, returning the consent URL.
	///
	/// `redirect_target` is where the user lands after the callback; it must be a local path or
	/// an absolute URL on a trusted origin and defaults to `/`.
	pub async fn begin_authorization(
		&self,
		provider: &str,
		redirect_target: Option<&str>,
	) -> Result<AuthorizationRequest> {
		const KIND: FlowKind = FlowKind::Authorize;

		let span = FlowSpan::new(KIND, "begin_authorization").with_provider(provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.in_span(async move {
				let config = self.registry.resolve(provider)?;
				let redirect_target = self.origins.validate_redirect(redirect_target)?;
				let now = OffsetDateTime::now_utc();
				let state = common::random_string(STATE_LEN);
				let pkce = config.requires_pkce().then(PkcePair::generate);
				let url = build_authorize_url(&config, &state, pkce.as_ref());
				let expires_at = self.policy.state_expires_at(now)?;
				let pending = AuthorizationState {
					state: state.clone(),
					provider: config.id.clone(),
					created_at: now,
					expires_at,
					code_verifier: pkce.map(|pair| pair.verifier),
					redirect_target,
				};

				<dyn StateStore>::insert_state(self.states.as_ref(), pending).await?;

				tracing::debug!(provider = %config.id, "Authorization state issued.");

				Ok(AuthorizationRequest { provider: config.id.clone(), url, state, expires_at })
			})
			.await;

		common::finish(KIND, result)
	}

	/// Checks the request origin and then starts a sign-in.
	///
	/// Untrusted origins are rejected before any state is created.
	pub async fn sign_in(
		&self,
		origin: Option<&str>,
		provider: &str,
		redirect_target: Option<&str>,
	) -> Result<AuthorizationRequest> {
		self.origins.check(origin)?;

		self.begin_authorization(provider, redirect_target).await
	}
}

struct PkcePair {
	verifier: Secret,
	challenge: String,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = common::random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier: Secret::new(verifier), challenge }
	}
}

fn build_authorize_url(config: &ProviderConfig, state: &str, pkce: Option<&PkcePair>) -> Url {
	let mut params = vec![
		("client_id", config.client_id.as_str()),
		("redirect_uri", config.redirect_uri.as_str()),
		("response_type", "code"),
	];
	let scope = config.scope_param();

	if let Some(scope) = scope.as_deref() {
		params.push(("scope", scope));
	}

	params.push(("state", state));

	if let Some(pkce) = pkce {
		params.push(("code_challenge", pkce.challenge.as_str()));
		params.push(("code_challenge_method", PKCE_METHOD));
	}

	params.extend(config.extra_auth_params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

	let encoded = params
		.iter()
		.map(|(name, value)| {
			format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
		})
		.collect::<Vec<_>>()
		.join("&");
	let mut url = config.endpoints.authorization.clone();
	let query = match url.query().filter(|existing| !existing.is_empty()) {
		Some(existing) => format!("{existing}&{encoded}"),
		None => encoded,
	};

	url.set_query(Some(&query));

	url
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
