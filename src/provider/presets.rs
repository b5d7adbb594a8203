//! Ready-made provider configurations.
//!
//! Presets return a seeded [`ProviderConfigBuilder`] so callers can still override scopes,
//! extra parameters, or endpoints before validation.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, Secret},
	error::ConfigError,
	profile::ProfileMapping,
	provider::{ClientAuthMethod, ProviderConfigBuilder, ProviderQuirks},
};

/// Identifier used by the Strava preset.
pub const STRAVA: &str = "strava";

const STRAVA_AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";
const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const STRAVA_ATHLETE_URL: &str = "https://www.strava.com/api/v3/athlete";
const STRAVA_DEFAULT_SCOPES: [&str; 3] = ["read", "profile:read_all", "activity:read_all"];

/// Strava: comma-delimited scopes, credentials in the POST body, `approval_prompt=auto`, and
/// identities mapped from the authenticated athlete.
pub fn strava(
	client_id: impl Into<String>,
	client_secret: impl Into<Secret>,
	redirect_uri: Url,
) -> Result<ProviderConfigBuilder, ConfigError> {
	let id = ProviderId::new(STRAVA)?;
	let scopes = ScopeSet::new(STRAVA_DEFAULT_SCOPES)?;

	Ok(ProviderConfigBuilder::new(id)
		.credentials(client_id, client_secret)
		.authorization_endpoint(parse_endpoint(STRAVA_AUTHORIZE_URL)?)
		.token_endpoint(parse_endpoint(STRAVA_TOKEN_URL)?)
		.user_info_endpoint(parse_endpoint(STRAVA_ATHLETE_URL)?)
		.redirect_uri(redirect_uri)
		.scopes(scopes)
		.extra_auth_param("approval_prompt", "auto")
		.client_auth_method(ClientAuthMethod::ClientSecretPost)
		.quirks(ProviderQuirks::comma_delimited())
		.profile(
			ProfileMapping::new("id")
				.name_fields(["firstname", "lastname"])
				.email_field("email")
				.avatar_field("profile"),
		))
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn strava_preset_matches_provider_conventions() {
		let redirect = Url::parse("https://app.example.com/auth/callback")
			.expect("Redirect fixture should parse.");
		let config = strava("12345", "shh", redirect)
			.expect("Preset should seed a builder.")
			.build()
			.expect("Preset should validate.");

		assert_eq!(config.id.as_ref(), STRAVA);
		assert_eq!(
			config.scope_param().as_deref(),
			Some("read,profile:read_all,activity:read_all")
		);
		assert_eq!(
			config.extra_auth_params.get("approval_prompt").map(String::as_str),
			Some("auto")
		);
		assert_eq!(config.client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(config.endpoints.user_info.as_str(), STRAVA_ATHLETE_URL);
		assert!(config.has_credentials());
	}

	#[test]
	fn strava_preset_without_credentials_is_disabled() {
		let redirect = Url::parse("https://app.example.com/auth/callback")
			.expect("Redirect fixture should parse.");
		let config = strava("", "", redirect)
			.expect("Preset should seed a builder.")
			.build()
			.expect("Blank credentials still validate.");

		assert!(!config.has_credentials());
	}
}
