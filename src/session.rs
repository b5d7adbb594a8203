//! Application sessions bound to a user identity and the provider's tokens.
//!
//! A session moves `Active → Refreshing → Active | Expired`; `Expired` is terminal and every
//! later access fails with [`Error::SessionExpired`]. The [`SessionManager`] owns that
//! lifecycle and refreshes tokens lazily when a validation lands inside the refresh margin.

pub mod manager;

pub use manager::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
// self
use crate::{_prelude::*, auth::TokenSet, error::ConfigError, profile::IdentityKey};

const SESSION_ID_BYTES: usize = 32;

/// Opaque, unguessable session identifier (32 random bytes, base64url without padding).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);
impl SessionId {
	/// Draws a fresh identifier from the thread-local CSPRNG.
	pub fn generate() -> Self {
		let mut bytes = [0_u8; SESSION_ID_BYTES];

		rand::rng().fill_bytes(&mut bytes);

		Self(URL_SAFE_NO_PAD.encode(bytes))
	}

	/// Accepts a client-supplied value (e.g. a cookie) if it has the identifier's shape.
	pub fn parse(value: &str) -> Option<Self> {
		let well_formed = !value.is_empty()
			&& value.len() <= 128
			&& value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

		well_formed.then(|| Self(value.to_owned()))
	}

	/// Returns the raw identifier. Treat it like a credential.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let prefix: String = self.0.chars().take(6).collect();

		write!(f, "SessionId({prefix}…)")
	}
}

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	/// Usable; tokens are valid or refreshable.
	Active,
	/// A refresh is in flight.
	Refreshing,
	/// Terminal; kept as a tombstone until swept.
	Expired,
}

/// Persisted application session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
	/// Session identifier.
	pub id: SessionId,
	/// Identity the session belongs to.
	pub identity: IdentityKey,
	/// The single active token set.
	pub tokens: TokenSet,
	/// Creation instant.
	pub issued_at: OffsetDateTime,
	/// Absolute session expiry.
	pub expires_at: OffsetDateTime,
	/// Instant of the last successful refresh.
	pub last_refreshed_at: Option<OffsetDateTime>,
	/// Lifecycle status.
	pub status: SessionStatus,
}
impl Session {
	/// Returns `true` once the session is terminal or past its absolute expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.status == SessionStatus::Expired || instant >= self.expires_at
	}
}

/// Cookie-ready view of a new session; the cookie name and attributes belong to the caller.
#[derive(Clone, Debug)]
pub struct SessionCookie {
	/// Cookie value (the session identifier).
	pub value: String,
	/// Absolute expiry matching the session.
	pub expires_at: OffsetDateTime,
	/// Relative lifetime for `Max-Age`.
	pub max_age: Duration,
}

/// Lifetimes governing authorization state, sessions, and refresh timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
	/// Lifetime of a pending authorization state.
	pub state_ttl: Duration,
	/// Absolute session lifetime.
	pub session_ttl: Duration,
	/// Tokens expiring within this margin are refreshed on validation.
	pub refresh_margin: Duration,
}
impl SessionPolicy {
	/// Default authorization state lifetime.
	pub const DEFAULT_STATE_TTL: Duration = Duration::minutes(10);
	/// Default session lifetime.
	pub const DEFAULT_SESSION_TTL: Duration = Duration::days(30);
	/// Default refresh margin.
	pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);
	/// Upper bound accepted for any lifetime in the policy.
	pub const MAX_TTL: Duration = Duration::days(3650);

	/// Overrides the authorization state lifetime.
	pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
		self.state_ttl = ttl;

		self
	}

	/// Overrides the session lifetime.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.session_ttl = ttl;

		self
	}

	/// Overrides the refresh margin; negative values clamp to zero.
	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Rejects lifetimes outside `0..=MAX_TTL`.
	pub fn validate(self) -> Result<Self, ConfigError> {
		for (key, ttl) in [
			("session.state_ttl_secs", self.state_ttl),
			("session.session_ttl_secs", self.session_ttl),
			("session.refresh_margin_secs", self.refresh_margin),
		] {
			if ttl.is_negative() || ttl > Self::MAX_TTL {
				let max = Self::MAX_TTL.whole_seconds();

				return Err(ConfigError::InvalidSetting {
					key: key.into(),
					reason: format!("must be between 0 and {max} seconds"),
				});
			}
		}

		Ok(self)
	}

	/// Expiry of an authorization state issued at `now`.
	pub fn state_expires_at(&self, now: OffsetDateTime) -> Result<OffsetDateTime, ConfigError> {
		expires_after(now, self.state_ttl, "session.state_ttl_secs")
	}

	/// Absolute expiry of a session issued at `now`.
	pub fn session_expires_at(&self, now: OffsetDateTime) -> Result<OffsetDateTime, ConfigError> {
		expires_after(now, self.session_ttl, "session.session_ttl_secs")
	}
}
impl Default for SessionPolicy {
	fn default() -> Self {
		Self {
			state_ttl: Self::DEFAULT_STATE_TTL,
			session_ttl: Self::DEFAULT_SESSION_TTL,
			refresh_margin: Self::DEFAULT_REFRESH_MARGIN,
		}
	}
}

fn expires_after(
	now: OffsetDateTime,
	ttl: Duration,
	key: &str,
) -> Result<OffsetDateTime, ConfigError> {
	now.checked_add(ttl).ok_or_else(|| ConfigError::InvalidSetting {
		key: key.into(),
		reason: "lifetime overflows the calendar".into(),
	})
}
