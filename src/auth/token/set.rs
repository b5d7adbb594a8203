//! Token sets returned by the provider's token endpoint, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Secret},
};

/// Freshness of a token set relative to a refresh margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Access token is valid beyond the refresh margin.
	Fresh,
	/// Access token is still valid but expires within the refresh margin.
	ExpiringSoon,
	/// Access token exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`TokenSetBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenSetBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the relative expiry overflows the representable date range.
	#[error("Expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Access token, optional refresh token, and expiry issued for one user + provider pairing.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<Secret>,
	/// Scopes granted to this token set.
	pub scope: ScopeSet,
	/// Instant the token endpoint answered.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from `issued_at + expires_in`.
	pub expires_at: OffsetDateTime,
}
impl TokenSet {
	/// Returns a builder for constructing token sets.
	pub fn builder(scope: ScopeSet) -> TokenSetBuilder {
		TokenSetBuilder::new(scope)
	}

	/// Computes freshness at `instant` using the provided refresh margin.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if self.expires_at - instant <= margin {
			return TokenStatus::ExpiringSoon;
		}

		TokenStatus::Fresh
	}

	/// Returns `true` if the access token expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the access token should be refreshed at `instant`.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		!matches!(self.status_at(instant, margin), TokenStatus::Fresh)
	}

	/// Produces the replacement set after a refresh, keeping the old refresh token when the
	/// provider did not rotate it.
	pub fn rotated(self, previous: &TokenSet) -> TokenSet {
		TokenSet {
			refresh_token: self.refresh_token.or_else(|| previous.refresh_token.clone()),
			..self
		}
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenSet`].
#[derive(Clone, Debug)]
pub struct TokenSetBuilder {
	scope: ScopeSet,
	access_token: Option<Secret>,
	refresh_token: Option<Secret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenSetBuilder {
	fn new(scope: ScopeSet) -> Self {
		Self {
			scope,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(Secret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(token));

		self
	}

	/// Consumes the builder and produces a [`TokenSet`].
	pub fn build(self) -> Result<TokenSet, TokenSetBuilderError> {
		let access_token = self.access_token.ok_or(TokenSetBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(TokenSetBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(TokenSetBuilderError::MissingExpiry),
		};

		Ok(TokenSet {
			access_token,
			refresh_token: self.refresh_token,
			scope: self.scope,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn scope() -> ScopeSet {
		ScopeSet::new(["read", "profile:read_all"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn status_honors_refresh_margin() {
		let tokens = TokenSet::builder(scope())
			.access_token("access")
			.refresh_token("refresh")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Token set builder should succeed.");
		let margin = Duration::minutes(5);

		assert_eq!(
			tokens.status_at(macros::datetime!(2025-01-01 00:30 UTC), margin),
			TokenStatus::Fresh
		);
		assert_eq!(
			tokens.status_at(macros::datetime!(2025-01-01 00:56 UTC), margin),
			TokenStatus::ExpiringSoon
		);
		assert_eq!(
			tokens.status_at(macros::datetime!(2025-01-01 01:00 UTC), margin),
			TokenStatus::Expired
		);
		assert!(tokens.needs_refresh_at(macros::datetime!(2025-01-01 00:55 UTC), margin));
		assert!(!tokens.needs_refresh_at(macros::datetime!(2025-01-01 00:54 UTC), margin));
	}

	#[test]
	fn builder_handles_relative_expiry_and_missing_fields() {
		let tokens = TokenSet::builder(scope())
			.access_token("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(6))
			.build()
			.expect("Token set builder should support relative expiry.");

		assert_eq!(tokens.expires_at, macros::datetime!(2025-01-01 06:00 UTC));
		assert_eq!(
			TokenSet::builder(scope()).expires_in(Duration::hours(1)).build().err(),
			Some(TokenSetBuilderError::MissingAccessToken)
		);
		assert_eq!(
			TokenSet::builder(scope()).access_token("a").build().err(),
			Some(TokenSetBuilderError::MissingExpiry)
		);
		assert_eq!(
			TokenSet::builder(scope())
				.access_token("a")
				.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
				.expires_in(Duration::seconds(900_000_000_000_000))
				.build()
				.err(),
			Some(TokenSetBuilderError::ExpiryOutOfRange)
		);
	}

	#[test]
	fn rotation_keeps_previous_refresh_token_when_absent() {
		let previous = TokenSet::builder(scope())
			.access_token("old-access")
			.refresh_token("old-refresh")
			.expires_in(Duration::minutes(1))
			.build()
			.expect("Previous token set should build.");
		let kept = TokenSet::builder(scope())
			.access_token("new-access")
			.expires_in(Duration::hours(6))
			.build()
			.expect("Refreshed token set should build.")
			.rotated(&previous);

		assert_eq!(kept.access_token.expose(), "new-access");
		assert_eq!(kept.refresh_token.as_ref().map(Secret::expose), Some("old-refresh"));

		let rotated = TokenSet::builder(scope())
			.access_token("newer-access")
			.refresh_token("new-refresh")
			.expires_in(Duration::hours(6))
			.build()
			.expect("Rotated token set should build.")
			.rotated(&previous);

		assert_eq!(rotated.refresh_token.as_ref().map(Secret::expose), Some("new-refresh"));
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let tokens = TokenSet::builder(scope())
			.access_token("visible-access")
			.refresh_token("visible-refresh")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token set should build.");
		let rendered = format!("{tokens:?}");

		assert!(!rendered.contains("visible-access"));
		assert!(!rendered.contains("visible-refresh"));
	}
}
