//! Application settings loaded from TOML with environment overrides.
//!
//! ```toml
//! base_url = "https://app.example.com"
//! trusted_origins = ["https://admin.example.com"]
//!
//! [session]
//! session_ttl_secs = 2592000
//!
//! [[providers]]
//! id = "strava"
//! preset = "strava"
//! ```
//!
//! Credentials usually come from the environment as `<ID>_CLIENT_ID` / `<ID>_CLIENT_SECRET`
//! (`STRAVA_CLIENT_ID`). The public base URL is resolved from the first non-empty variable in
//! [`BASE_URL_VARS`], then `base_url`, then [`DEFAULT_BASE_URL`]; host-only values get `https://`.

// std
use std::path::Path;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, Secret},
	error::ConfigError,
	flows::RetryPolicy,
	origin::{self, TrustedOrigins},
	profile::ProfileMapping,
	provider::{
		ClientAuthMethod, ProviderConfig, ProviderConfigBuilder, ProviderQuirks, ProviderRegistry,
		presets,
	},
	session::SessionPolicy,
};

/// Environment variables consulted, in order, for the public base URL.
pub const BASE_URL_VARS: [&str; 5] =
	["AUTH_URL", "PUBLIC_AUTH_URL", "VERCEL_URL", "VERCEL_BRANCH_URL", "PUBLIC_VERCEL_URL"];
/// Base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
/// Comma-separated trusted origins that replace the configured list.
pub const TRUSTED_ORIGINS_VAR: &str = "TRUSTED_ORIGINS";
/// Path appended to the base URL when a provider has no explicit redirect URI.
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";

/// Root settings document.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	/// Public base URL of the application.
	pub base_url: Option<String>,
	/// Additional trusted origins; the base URL is always trusted.
	pub trusted_origins: Vec<String>,
	/// Session lifetimes.
	pub session: SessionSettings,
	/// Refresh retry policy.
	pub retry: RetrySettings,
	/// Provider transport settings.
	pub http: HttpSettings,
	/// Session cookie settings.
	pub cookie: CookieSettings,
	/// Configured providers.
	pub providers: Vec<ProviderSettings>,
}
impl Settings {
	/// Parses a TOML document.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		toml::from_str(raw).map_err(|source| ConfigError::ParseSettings { source })
	}

	/// Reads and parses a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadSettings {
			path: path.display().to_string(),
			source,
		})?;

		Self::from_toml_str(&raw)
	}

	/// Applies overrides from the process environment.
	pub fn with_process_env(self) -> Self {
		self.with_env(|key| std::env::var(key).ok())
	}

	/// Applies overrides from `env`, which maps a variable name to its value.
	pub fn with_env<F>(mut self, env: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

		if let Some(base_url) = BASE_URL_VARS.iter().find_map(|key| lookup(key)) {
			self.base_url = Some(base_url);
		}
		if let Some(origins) = lookup(TRUSTED_ORIGINS_VAR) {
			self.trusted_origins =
				origins.split(',').map(|value| value.trim().to_owned()).collect();
		}

		for provider in &mut self.providers {
			let prefix = env_prefix(&provider.id);

			if let Some(client_id) = lookup(&format!("{prefix}_CLIENT_ID")) {
				provider.client_id = client_id;
			}
			if let Some(secret) = lookup(&format!("{prefix}_CLIENT_SECRET")) {
				provider.client_secret = Secret::new(secret);
			}
		}

		self
	}

	/// Normalized public origin (`scheme://host[:port]`).
	pub fn base_url(&self) -> Result<String, ConfigError> {
		let raw = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

		origin::normalize_origin(raw).ok_or_else(|| ConfigError::InvalidSetting {
			key: "base_url".into(),
			reason: format!("`{raw}` is not an http(s) origin"),
		})
	}

	/// Base URL followed by the configured trusted origins.
	pub fn trusted_origins(&self) -> Result<TrustedOrigins, ConfigError> {
		let base = self.base_url()?;

		let extra = self.trusted_origins.iter().map(String::as_str);

		TrustedOrigins::new(std::iter::once(base.as_str()).chain(extra))
	}

	/// Session policy derived from [`SessionSettings`], rejecting lifetimes above
	/// [`SessionPolicy::MAX_TTL`].
	pub fn session_policy(&self) -> Result<SessionPolicy, ConfigError> {
		SessionPolicy::default()
			.with_state_ttl(seconds(self.session.state_ttl_secs))
			.with_session_ttl(seconds(self.session.session_ttl_secs))
			.with_refresh_margin(seconds(self.session.refresh_margin_secs))
			.validate()
	}

	/// Retry policy derived from [`RetrySettings`].
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.retry.max_attempts,
			initial_backoff: milliseconds(self.retry.initial_backoff_ms),
			max_backoff: milliseconds(self.retry.max_backoff_ms),
		}
	}

	/// Per-call timeout for provider requests.
	pub fn http_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.http.timeout_secs.max(1))
	}

	/// Validates every provider and builds the registry.
	pub fn provider_registry(&self) -> Result<ProviderRegistry, ConfigError> {
		let base_url = self.base_url()?;

		ProviderRegistry::new(
			self.providers
				.iter()
				.map(|provider| provider.to_config(&base_url))
				.collect::<Result<Vec<_>, _>>()?,
		)
	}
}

/// Lifetimes, in seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
	/// Authorization state lifetime.
	pub state_ttl_secs: u64,
	/// Absolute session lifetime.
	pub session_ttl_secs: u64,
	/// Refresh margin before token expiry.
	pub refresh_margin_secs: u64,
}
impl Default for SessionSettings {
	fn default() -> Self {
		Self {
			state_ttl_secs: SessionPolicy::DEFAULT_STATE_TTL.whole_seconds().unsigned_abs(),
			session_ttl_secs: SessionPolicy::DEFAULT_SESSION_TTL.whole_seconds().unsigned_abs(),
			refresh_margin_secs: SessionPolicy::DEFAULT_REFRESH_MARGIN
				.whole_seconds()
				.unsigned_abs(),
		}
	}
}

/// Refresh retry settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
	/// Total attempts, including the first.
	pub max_attempts: u32,
	/// First backoff, in milliseconds.
	pub initial_backoff_ms: u64,
	/// Backoff ceiling, in milliseconds.
	pub max_backoff_ms: u64,
}
impl Default for RetrySettings {
	fn default() -> Self {
		let policy = RetryPolicy::default();

		Self {
			max_attempts: policy.max_attempts,
			initial_backoff_ms: policy.initial_backoff.whole_milliseconds().unsigned_abs() as u64,
			max_backoff_ms: policy.max_backoff.whole_milliseconds().unsigned_abs() as u64,
		}
	}
}

/// Provider transport settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
	/// Per-call timeout, in seconds.
	pub timeout_secs: u64,
}
impl Default for HttpSettings {
	fn default() -> Self {
		Self { timeout_secs: 10 }
	}
}

/// Session cookie and error-redirect settings used by the HTTP boundary.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CookieSettings {
	/// Cookie name.
	pub name: String,
	/// Sets the `Secure` attribute.
	pub secure: bool,
	/// Page failed callbacks redirect to, with `?error=<category>`.
	pub error_path: String,
}
impl Default for CookieSettings {
	fn default() -> Self {
		Self { name: "session".into(), secure: true, error_path: "/auth/error".into() }
	}
}

/// One provider entry.
///
/// With `preset` set, every other field is an optional override of the preset.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
	/// Provider identifier.
	pub id: String,
	/// Built-in preset name (`strava`).
	pub preset: Option<String>,
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
	/// Redirect URI; defaults to the base URL plus [`DEFAULT_CALLBACK_PATH`].
	pub redirect_uri: Option<Url>,
	/// Requested scopes, in order.
	pub scopes: Option<Vec<String>>,
	/// Scope delimiter.
	pub scope_delimiter: Option<char>,
	/// Forces PKCE for confidential clients.
	pub pkce_required: Option<bool>,
	/// Token endpoint client authentication.
	pub client_auth_method: Option<ClientAuthMethod>,
	/// Extra authorization query parameters.
	pub extra_auth_params: BTreeMap<String, String>,
	/// Profile mapping rules.
	pub profile: Option<ProfileMapping>,
}
impl ProviderSettings {
	/// Builds and validates the provider configuration.
	pub fn to_config(&self, base_url: &str) -> Result<ProviderConfig, ConfigError> {
		let id = ProviderId::new(&self.id)?;
		let redirect_uri = match &self.redirect_uri {
			Some(url) => url.clone(),
			None => Url::parse(&format!("{base_url}{DEFAULT_CALLBACK_PATH}"))
				.map_err(|source| ConfigError::InvalidRedirect { source })?,
		};
		let (mut builder, mut quirks) = match self.preset.as_deref() {
			Some(presets::STRAVA) if id.as_ref() == presets::STRAVA => (
				presets::strava(self.client_id.clone(), self.client_secret.clone(), redirect_uri)?,
				ProviderQuirks::comma_delimited(),
			),
			Some(preset) =>
				return Err(ConfigError::InvalidSetting {
					key: format!("providers.{}.preset", self.id),
					reason: format!("preset `{preset}` cannot be used for this provider"),
				}),
			None => (
				ProviderConfigBuilder::new(id)
					.credentials(self.client_id.clone(), self.client_secret.clone())
					.redirect_uri(redirect_uri),
				ProviderQuirks::default(),
			),
		};

		if let Some(url) = &self.authorization_endpoint {
			builder = builder.authorization_endpoint(url.clone());
		}
		if let Some(url) = &self.token_endpoint {
			builder = builder.token_endpoint(url.clone());
		}
		if let Some(url) = &self.user_info_endpoint {
			builder = builder.user_info_endpoint(url.clone());
		}
		if let Some(scopes) = &self.scopes {
			builder = builder.scopes(ScopeSet::new(scopes.iter().map(String::as_str))?);
		}
		if let Some(delimiter) = self.scope_delimiter {
			quirks.scope_delimiter = delimiter;
		}
		if let Some(pkce_required) = self.pkce_required {
			quirks.pkce_required = pkce_required;
		}
		if let Some(method) = self.client_auth_method {
			builder = builder.client_auth_method(method);
		}
		if let Some(profile) = &self.profile {
			builder = builder.profile(profile.clone());
		}

		for (name, value) in &self.extra_auth_params {
			builder = builder.extra_auth_param(name.clone(), value.clone());
		}

		Ok(builder.quirks(quirks).build()?)
	}
}

fn env_prefix(id: &str) -> String {
	id.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
		.collect()
}

fn seconds(value: u64) -> Duration {
	Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

fn milliseconds(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}
