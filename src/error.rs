//! Error taxonomy shared by the sign-in flow, the session manager, and the stores.
//!
//! [`Error`] is what public operations return. Failures of an individual provider call are
//! classified as [`ProviderError`] first and then wrapped into the flow-specific variant
//! ([`Error::TokenExchangeFailed`], [`Error::RefreshFailed`], [`Error::UserInfoFailed`]) so
//! callers can tell which step failed without inspecting provider payloads.

// self
use crate::{_prelude::*, auth::ProviderId};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// No provider is registered under the requested identifier.
	#[error("Provider `{provider}` is not registered.")]
	UnknownProvider {
		/// Identifier supplied by the caller.
		provider: String,
	},
	/// Provider is registered but lacks the credentials required to start a flow.
	#[error("Provider `{provider}` is disabled because its client credentials are missing.")]
	ProviderDisabled {
		/// Identifier of the disabled provider.
		provider: ProviderId,
	},
	/// Authorization state was absent, expired, already consumed, or bound to another provider.
	#[error("Authorization state rejected: {reason}.")]
	InvalidState {
		/// Short, log-safe reason.
		reason: &'static str,
	},
	/// Request origin is not part of the trusted allow-list.
	#[error("Origin `{origin}` is not trusted.")]
	UntrustedOrigin {
		/// Origin observed on the request (or a placeholder when none was supplied).
		origin: String,
	},
	/// Authorization code exchange failed; codes are single-use so this is never retried.
	#[error("Authorization code exchange failed.")]
	TokenExchangeFailed(#[source] ProviderError),
	/// Refresh grant failed after any transient retries.
	#[error("Token refresh failed.")]
	RefreshFailed(#[source] ProviderError),
	/// User-info request failed after a successful code exchange.
	#[error("User-info request failed.")]
	UserInfoFailed(#[source] ProviderError),
	/// User-info payload lacks the field that identifies the user at the provider.
	#[error("Provider `{provider}` profile is missing the `{field}` identity field.")]
	MissingProviderUserId {
		/// Provider that returned the profile.
		provider: ProviderId,
		/// Configured identity field path.
		field: String,
	},
	/// Session identifier is unknown.
	#[error("Session not found.")]
	SessionNotFound,
	/// Session expired or lost its tokens; the user must sign in again.
	#[error("Session expired.")]
	SessionExpired,
}
impl Error {
	/// Returns `true` for errors that indicate a forged, replayed, or misdirected request.
	pub fn is_security_rejection(&self) -> bool {
		matches!(self, Self::InvalidState { .. } | Self::UntrustedOrigin { .. })
	}
}

/// Classified failure of a single provider call (token or user-info endpoint).
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, request construction).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Provider rejected the grant (bad code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider refused the requested scopes.
	#[error("Provider refused the requested scopes: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Response body could not be parsed as JSON of the expected shape.
	#[error("Provider returned a body that could not be parsed.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Response parsed but violated the OAuth contract (missing or invalid fields).
	#[error("Provider returned a malformed response: {reason}.")]
	MalformedResponse {
		/// Which part of the response was rejected.
		reason: String,
	},
}
impl ProviderError {
	/// Returns `true` when the failure is worth retrying (timeouts, throttling, 5xx, network).
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}

	/// Retry-After hint reported by the provider, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::Endpoint { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}

	pub(crate) fn malformed(reason: impl Into<String>) -> Self {
		Self::MalformedResponse { reason: reason.into() }
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Provider endpoint cannot be used by the OAuth client.
	#[error("Provider endpoint is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider configuration failed validation.
	#[error(transparent)]
	Provider(#[from] crate::provider::ProviderConfigError),
	/// Scope list cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Trusted-origin allow-list is empty.
	#[error("At least one trusted origin must be configured.")]
	NoTrustedOrigins,
	/// Trusted-origin entry cannot be parsed as a scheme-qualified origin.
	#[error("Trusted origin `{value}` is not a valid origin.")]
	InvalidOrigin {
		/// Raw configured value.
		value: String,
	},
	/// Two registered providers share the same identifier.
	#[error("Provider `{provider}` is registered more than once.")]
	DuplicateProvider {
		/// Duplicated identifier.
		provider: ProviderId,
	},
	/// Settings file could not be read.
	#[error("Settings file `{path}` could not be read.")]
	ReadSettings {
		/// Path that was read.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Settings document is not valid TOML of the expected shape.
	#[error("Settings could not be parsed.")]
	ParseSettings {
		/// Underlying TOML failure.
		#[source]
		source: toml::de::Error,
	},
	/// A settings value is present but unusable.
	#[error("Setting `{key}` is invalid: {reason}.")]
	InvalidSetting {
		/// Dotted settings key.
		key: String,
		/// Why the value was rejected.
		reason: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider endpoint returned a throttling, server-side, or timeout failure.
	#[error("Provider endpoint returned a temporary failure: {message}.")]
	Endpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}

/// Transport-level failures (network, IO, request construction).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
	/// Outgoing HTTP request could not be assembled.
	#[error("HTTP request could not be constructed.")]
	Request(#[from] oauth2::http::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn transient_classification_drives_retry() {
		let throttled = ProviderError::from(TransientError::Endpoint {
			message: "slow down".into(),
			status: Some(429),
			retry_after: Some(Duration::seconds(3)),
		});

		assert!(throttled.is_transient());
		assert_eq!(throttled.retry_after(), Some(Duration::seconds(3)));

		let rejected = ProviderError::InvalidGrant { reason: "revoked".into() };

		assert!(!rejected.is_transient());
		assert_eq!(rejected.retry_after(), None);
	}

	#[test]
	fn flow_errors_keep_provider_error_as_source() {
		let err = Error::RefreshFailed(ProviderError::malformed("missing access_token"));
		let source = StdError::source(&err).expect("Refresh failure should expose its cause.");

		assert!(source.to_string().contains("missing access_token"));
		assert!(!err.to_string().contains("access_token"));
	}

	#[test]
	fn security_rejections_are_flagged() {
		assert!(Error::InvalidState { reason: "replayed" }.is_security_rejection());
		assert!(
			Error::UntrustedOrigin { origin: "https://evil.test".into() }.is_security_rejection()
		);
		assert!(!Error::SessionExpired.is_security_rejection());
	}
}
