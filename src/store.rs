//! Storage contracts for authorization state, sessions, and identities, plus the in-memory
//! implementation.
//!
//! Every contract returns a boxed `Send` future so implementations can talk to remote
//! databases without the flows knowing. Authorization state consumption and token rotation are
//! single atomic operations on the backend; callers never read-then-write.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::TokenSet,
	flows::AuthorizationState,
	profile::{IdentityKey, UpsertOutcome, UserIdentity},
	session::{Session, SessionId, SessionStatus},
};

/// Future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Pending authorization states keyed by their `state` value.
pub trait StateStore
where
	Self: Send + Sync,
{
	/// Persists a new authorization state.
	fn insert_state(&self, state: AuthorizationState) -> StoreFuture<'_, ()>;

	/// Atomically removes and returns the state, so a value can be consumed at most once.
	fn consume_state<'a>(&'a self, state: &'a str)
	-> StoreFuture<'a, Option<AuthorizationState>>;

	/// Deletes states that expired at or before `now`, returning how many were removed.
	fn purge_states(&self, now: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Persistence for application sessions.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Persists a new session.
	fn insert(&self, session: Session) -> StoreFuture<'_, ()>;

	/// Fetches a session by identifier.
	fn fetch<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>>;

	/// Updates the status, returning `false` when the session does not exist.
	fn set_status<'a>(&'a self, id: &'a SessionId, status: SessionStatus)
	-> StoreFuture<'a, bool>;

	/// Replaces the token set if the stored refresh token still equals `expected_refresh`,
	/// marking the session `Active` and stamping `last_refreshed_at`.
	fn compare_and_swap_tokens<'a>(
		&'a self,
		id: &'a SessionId,
		expected_refresh: Option<&'a str>,
		replacement: TokenSet,
		refreshed_at: OffsetDateTime,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes a session, returning it if it existed.
	fn remove<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>>;

	/// Deletes sessions that are `Expired` or past their absolute expiry, returning their ids.
	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, Vec<SessionId>>;
}

/// Persistence for normalized identities.
pub trait IdentityStore
where
	Self: Send + Sync,
{
	/// Inserts or overwrites the identity stored under its `(provider, provider_user_id)` key.
	fn upsert(&self, identity: UserIdentity) -> StoreFuture<'_, UpsertOutcome>;

	/// Fetches an identity by key.
	fn fetch_identity<'a>(&'a self, key: &'a IdentityKey)
	-> StoreFuture<'a, Option<UserIdentity>>;
}

/// Result of a token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh token matched and the tokens were replaced.
	Updated,
	/// The session exists but its refresh token changed underneath the caller.
	RefreshMismatch,
	/// No session matched the identifier.
	Missing,
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_public_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error).expect("Error should expose the store error.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
