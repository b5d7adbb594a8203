//! Provider strategy hooks that classify provider failures and decorate token requests.
//!
//! Strategies only see crate-owned data (status codes, OAuth error fields, a body preview), so
//! a provider can tune error classification without the flows depending on any HTTP client.

// self
use crate::_prelude::*;

/// Provider endpoint call observed by a strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderCall {
	/// `grant_type=authorization_code` token request.
	CodeExchange,
	/// `grant_type=refresh_token` token request.
	Refresh,
	/// Bearer-authenticated user-info request.
	UserInfo,
}
impl ProviderCall {
	/// Returns a stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderCall::CodeExchange => "code_exchange",
			ProviderCall::Refresh => "refresh",
			ProviderCall::UserInfo => "user_info",
		}
	}

	/// Returns the RFC 6749 grant identifier for token calls.
	pub const fn grant_type(self) -> Option<&'static str> {
		match self {
			ProviderCall::CodeExchange => Some("authorization_code"),
			ProviderCall::Refresh => Some("refresh_token"),
			ProviderCall::UserInfo => None,
		}
	}
}
impl Display for ProviderCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Strategy hook that lets providers classify failures and extend token requests.
///
/// Only `classify_error` is required; `augment_token_request` defaults to a no-op.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed provider call into a canonical category.
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form parameters to a token request before it is sent.
	fn augment_token_request(&self, _call: ProviderCall, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad code, revoked refresh token, denied consent).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the token covers.
	InsufficientScope,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Call that failed.
	pub call: ProviderCall,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated response body for payloads without OAuth fields.
	pub body_preview: Option<String>,
	/// Failure originated from the network or transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context for the provided call.
	pub fn new(call: ProviderCall) -> Self {
		Self {
			call,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Context for transport-level failures.
	pub fn network_failure(call: ProviderCall) -> Self {
		Self { network_error: true, ..Self::new(call) }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a log-safe length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy based on RFC 6749 error codes.
///
/// Structured OAuth fields win, then body hints, then the HTTP status code. Network failures
/// are always transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}
		// Throttling and server faults stay retryable whatever the body says.
		if matches!(ctx.http_status, Some(429 | 500..=599)) {
			return ProviderErrorKind::Transient;
		}
		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.call, ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	let value = value.to_ascii_lowercase();

	match value.as_str() {
		"invalid_grant" | "access_denied" | "invalid_token" =>
			Some(ProviderErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(ProviderErrorKind::InvalidClient),
		"invalid_scope" | "insufficient_scope" => Some(ProviderErrorKind::InsufficientScope),
		"temporarily_unavailable" | "server_error" => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("authorization error") =>
			Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") || text.contains("unauthorized_client") =>
			Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(call: ProviderCall, status: Option<u16>) -> ProviderErrorKind {
	match (call, status) {
		// A rejected bearer token means the grant behind it is gone.
		(ProviderCall::UserInfo, Some(401)) => ProviderErrorKind::InvalidGrant,
		(_, Some(400 | 404 | 410)) => ProviderErrorKind::InvalidGrant,
		(_, Some(401)) => ProviderErrorKind::InvalidClient,
		(_, Some(403)) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_fields_take_priority_over_status() {
		let strategy = DefaultProviderStrategy;
		let ctx = ProviderErrorContext::new(ProviderCall::Refresh)
			.with_http_status(401)
			.with_oauth_error("invalid_grant");

		assert_eq!(strategy.classify_error(&ctx), ProviderErrorKind::InvalidGrant);

		let ctx = ProviderErrorContext::new(ProviderCall::CodeExchange)
			.with_http_status(400)
			.with_oauth_error("unknown")
			.with_error_description("Client is unauthorized_client");

		assert_eq!(strategy.classify_error(&ctx), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn throttling_and_network_failures_are_transient() {
		let strategy = DefaultProviderStrategy;

		assert_eq!(
			strategy.classify_error(
				&ProviderErrorContext::new(ProviderCall::Refresh)
					.with_http_status(429)
					.with_oauth_error("invalid_grant")
			),
			ProviderErrorKind::Transient
		);
		assert_eq!(
			strategy.classify_error(&ProviderErrorContext::network_failure(ProviderCall::UserInfo)),
			ProviderErrorKind::Transient
		);
	}

	#[test]
	fn user_info_unauthorized_means_invalid_grant() {
		let strategy = DefaultProviderStrategy;
		let user_info = ProviderErrorContext::new(ProviderCall::UserInfo).with_http_status(401);
		let token = ProviderErrorContext::new(ProviderCall::CodeExchange).with_http_status(401);

		assert_eq!(strategy.classify_error(&user_info), ProviderErrorKind::InvalidGrant);
		assert_eq!(strategy.classify_error(&token), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn body_preview_is_truncated() {
		let ctx =
			ProviderErrorContext::new(ProviderCall::Refresh).with_body_preview("x".repeat(400));
		let preview = ctx.body_preview.expect("Preview should be stored.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
