// std
use std::net::{Ipv4Addr, Ipv6Addr};
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, Secret},
	profile::ProfileMapping,
	provider::{ClientAuthMethod, ProviderConfig, ProviderEndpoints, ProviderQuirks},
};

const RESERVED_AUTH_PARAMS: [&str; 7] = [
	"client_id",
	"redirect_uri",
	"response_type",
	"scope",
	"state",
	"code_challenge",
	"code_challenge_method",
];

/// Errors raised while constructing or validating provider configurations.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderConfigError {
	/// Authorization endpoint is required.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// User-info endpoint is required to build identities.
	#[error("Missing user-info endpoint.")]
	MissingUserInfoEndpoint,
	/// Redirect URI is required.
	#[error("Missing redirect URI.")]
	MissingRedirectUri,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// Extra authorization parameters cannot override the parameters the builder sets itself.
	#[error("Extra authorization parameter `{name}` is reserved.")]
	ReservedAuthParam {
		/// Offending parameter name.
		name: String,
	},
	/// Profile mapping must name the identity field.
	#[error("Profile mapping must name a non-empty identity field.")]
	MissingProfileIdField,
}

/// Builder for [`ProviderConfig`] values.
#[derive(Debug)]
pub struct ProviderConfigBuilder {
	/// Identifier for the provider being constructed.
	pub id: ProviderId,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: Secret,
	/// Authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint.
	pub token_endpoint: Option<Url>,
	/// User-info endpoint.
	pub user_info_endpoint: Option<Url>,
	/// Requested scopes.
	pub scopes: ScopeSet,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Option<Url>,
	/// Extra authorization parameters.
	pub extra_auth_params: BTreeMap<String, String>,
	/// Client authentication method for the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
	/// Profile mapping rules.
	pub profile: ProfileMapping,
}
impl ProviderConfigBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			client_id: String::new(),
			client_secret: Secret::default(),
			authorization_endpoint: None,
			token_endpoint: None,
			user_info_endpoint: None,
			scopes: ScopeSet::default(),
			redirect_uri: None,
			extra_auth_params: BTreeMap::new(),
			client_auth_method: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
			profile: ProfileMapping::default(),
		}
	}

	/// Sets the client credentials.
	pub fn credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<Secret>,
	) -> Self {
		self.client_id = client_id.into();
		self.client_secret = client_secret.into();

		self
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the user-info endpoint.
	pub fn user_info_endpoint(mut self, url: Url) -> Self {
		self.user_info_endpoint = Some(url);

		self
	}

	/// Replaces the requested scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Adds one extra authorization parameter.
	pub fn extra_auth_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_auth_params.insert(name.into(), value.into());

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Overrides the profile mapping.
	pub fn profile(mut self, profile: ProfileMapping) -> Self {
		self.profile = profile;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	///
	/// Blank credentials are accepted here; the registry disables such providers instead of
	/// failing startup.
	pub fn build(self) -> Result<ProviderConfig, ProviderConfigError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderConfigError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderConfigError::MissingTokenEndpoint)?;
		let user_info =
			self.user_info_endpoint.ok_or(ProviderConfigError::MissingUserInfoEndpoint)?;
		let redirect_uri = self.redirect_uri.ok_or(ProviderConfigError::MissingRedirectUri)?;
		let config = ProviderConfig {
			id: self.id,
			client_id: self.client_id.trim().to_owned(),
			client_secret: self.client_secret,
			endpoints: ProviderEndpoints { authorization, token, user_info },
			scopes: self.scopes,
			redirect_uri,
			extra_auth_params: self.extra_auth_params,
			client_auth_method: self.client_auth_method,
			quirks: self.quirks,
			profile: self.profile,
		};

		config.validate()?;

		Ok(config)
	}
}

impl ProviderConfig {
	fn validate(&self) -> Result<(), ProviderConfigError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("user-info", &self.endpoints.user_info)?;
		validate_endpoint("redirect", &self.redirect_uri)?;
		validate_scope_delimiter(self.quirks.scope_delimiter)?;

		if let Some(name) =
			self.extra_auth_params.keys().find(|name| RESERVED_AUTH_PARAMS.contains(&name.as_str()))
		{
			return Err(ProviderConfigError::ReservedAuthParam { name: name.clone() });
		}
		if self.profile.id.trim().is_empty() {
			return Err(ProviderConfigError::MissingProfileIdField);
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ProviderConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => Ipv4Addr::is_loopback(&ip),
		Some(Host::Ipv6(ip)) => Ipv6Addr::is_loopback(&ip),
		None => false,
	}
}

fn validate_scope_delimiter(delimiter: char) -> Result<(), ProviderConfigError> {
	if delimiter.is_control() {
		Err(ProviderConfigError::InvalidScopeDelimiter { delimiter })
	} else {
		Ok(())
	}
}
