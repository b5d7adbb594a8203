//! Thread-safe in-memory store for local development, demos, and tests.

// self
use crate::{
	_prelude::*,
	auth::{Secret, TokenSet},
	flows::AuthorizationState,
	profile::{IdentityKey, UpsertOutcome, UserIdentity},
	session::{Session, SessionId, SessionStatus},
	store::{
		CompareAndSwapOutcome, IdentityStore, SessionStore, StateStore, StoreError, StoreFuture,
	},
};

type Shared<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Process-local backend implementing every store contract.
///
/// Clones share the same maps.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	states: Shared<String, AuthorizationState>,
	sessions: Shared<SessionId, Session>,
	identities: Shared<IdentityKey, UserIdentity>,
}
impl MemoryStore {
	/// Number of pending authorization states.
	pub fn pending_states(&self) -> usize {
		self.states.read().len()
	}

	/// Number of stored sessions, including expired tombstones.
	pub fn session_count(&self) -> usize {
		self.sessions.read().len()
	}

	/// Number of stored identities.
	pub fn identity_count(&self) -> usize {
		self.identities.read().len()
	}

	fn cas_now(
		&self,
		id: &SessionId,
		expected_refresh: Option<&str>,
		replacement: TokenSet,
		refreshed_at: OffsetDateTime,
	) -> CompareAndSwapOutcome {
		let mut guard = self.sessions.write();
		let Some(session) = guard.get_mut(id) else {
			return CompareAndSwapOutcome::Missing;
		};

		if !Self::refresh_matches(session.tokens.refresh_token.as_ref(), expected_refresh) {
			return CompareAndSwapOutcome::RefreshMismatch;
		}

		session.tokens = replacement;
		session.last_refreshed_at = Some(refreshed_at);
		session.status = SessionStatus::Active;

		CompareAndSwapOutcome::Updated
	}

	fn refresh_matches(current: Option<&Secret>, expected: Option<&str>) -> bool {
		match (current.map(Secret::expose), expected) {
			(None, None) => true,
			(Some(cur), Some(exp)) => cur == exp,
			_ => false,
		}
	}
}
impl StateStore for MemoryStore {
	fn insert_state(&self, state: AuthorizationState) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.states.write().insert(state.state.clone(), state);

			Ok(())
		})
	}

	fn consume_state<'a>(
		&'a self,
		state: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationState>> {
		Box::pin(async move { Ok(self.states.write().remove(state)) })
	}

	fn purge_states(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			let mut guard = self.states.write();
			let before = guard.len();

			guard.retain(|_, state| !state.is_expired_at(now));

			Ok(before - guard.len())
		})
	}
}
impl SessionStore for MemoryStore {
	fn insert(&self, session: Session) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.sessions.write();

			if guard.contains_key(&session.id) {
				return Err(StoreError::Backend { message: "Session identifier collision".into() });
			}

			guard.insert(session.id.clone(), session);

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>> {
		Box::pin(async move { Ok(self.sessions.read().get(id).cloned()) })
	}

	fn set_status<'a>(
		&'a self,
		id: &'a SessionId,
		status: SessionStatus,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			match self.sessions.write().get_mut(id) {
				Some(session) => {
					session.status = status;

					Ok(true)
				},
				None => Ok(false),
			}
		})
	}

	fn compare_and_swap_tokens<'a>(
		&'a self,
		id: &'a SessionId,
		expected_refresh: Option<&'a str>,
		replacement: TokenSet,
		refreshed_at: OffsetDateTime,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(self.cas_now(id, expected_refresh, replacement, refreshed_at)) })
	}

	fn remove<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, Option<Session>> {
		Box::pin(async move { Ok(self.sessions.write().remove(id)) })
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, Vec<SessionId>> {
		Box::pin(async move {
			let mut guard = self.sessions.write();
			let expired: Vec<SessionId> = guard
				.values()
				.filter(|session| session.is_expired_at(now))
				.map(|session| session.id.clone())
				.collect();

			for id in &expired {
				guard.remove(id);
			}

			Ok(expired)
		})
	}
}
impl IdentityStore for MemoryStore {
	fn upsert(&self, identity: UserIdentity) -> StoreFuture<'_, UpsertOutcome> {
		Box::pin(async move {
			let outcome = match self.identities.write().insert(identity.key(), identity) {
				Some(_) => UpsertOutcome::Updated,
				None => UpsertOutcome::Created,
			};

			Ok(outcome)
		})
	}

	fn fetch_identity<'a>(
		&'a self,
		key: &'a IdentityKey,
	) -> StoreFuture<'a, Option<UserIdentity>> {
		Box::pin(async move { Ok(self.identities.read().get(key).cloned()) })
	}
}
