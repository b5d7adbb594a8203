//! Provider configuration data structures shared by every flow.
//!
//! One [`ProviderConfig`] shape describes every provider; per-provider behavior is expressed
//! only through data (endpoints, scope delimiter, extra authorization parameters, profile
//! mapping) so the exchange and mapping paths stay generic.

/// Builder API for assembling provider configurations.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, Secret},
	profile::ProfileMapping,
};

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE and never send a secret.
	NoneWithPkce,
}

/// Endpoint set declared by a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Consent screen the user agent is redirected to.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// User-info endpoint queried with the bearer access token.
	pub user_info: Url,
}

/// Immutable description of one OAuth provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
	/// Unique provider identifier.
	pub id: ProviderId,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; never logged.
	pub client_secret: Secret,
	/// Endpoint definitions.
	pub endpoints: ProviderEndpoints,
	/// Scopes requested on every authorization, in the order sent to the provider.
	pub scopes: ScopeSet,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Additional authorization query parameters (e.g. `approval_prompt`).
	pub extra_auth_params: BTreeMap<String, String>,
	/// Client authentication mechanism used at the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
	/// Rules that turn the user-info payload into a [`crate::profile::UserIdentity`].
	pub profile: ProfileMapping,
}
impl ProviderConfig {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderConfigBuilder {
		ProviderConfigBuilder::new(id)
	}

	/// Returns `true` when the credentials required to start a flow are present.
	///
	/// Public PKCE clients only need a client identifier.
	pub fn has_credentials(&self) -> bool {
		if self.client_id.trim().is_empty() {
			return false;
		}

		matches!(self.client_auth_method, ClientAuthMethod::NoneWithPkce)
			|| !self.client_secret.is_blank()
	}

	/// Returns `true` when authorization requests must carry a PKCE challenge.
	pub fn requires_pkce(&self) -> bool {
		self.quirks.pkce_required
			|| matches!(self.client_auth_method, ClientAuthMethod::NoneWithPkce)
	}

	/// Joins the configured scopes with the provider's delimiter.
	pub fn scope_param(&self) -> Option<String> {
		self.scopes.join(self.quirks.scope_delimiter)
	}
}
