//! Session lifecycle: creation, validation with lazy refresh, destruction, and sweeping.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, TokenSet},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	profile::UserIdentity,
	session::{Session, SessionCookie, SessionId, SessionPolicy, SessionStatus},
	store::{CompareAndSwapOutcome, IdentityStore, SessionStore},
};

/// Future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSet>> + 'a + Send>>;

/// Performs the refresh grant on behalf of the session manager.
///
/// Any error ends the session; implementations retry transient failures themselves.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Exchanges the refresh token in `tokens` for a new token set.
	fn refresh<'a>(&'a self, provider: &'a ProviderId, tokens: &'a TokenSet) -> RefreshFuture<'a>;
}

/// Creates, validates, and expires sessions.
///
/// Refreshes are serialized per session id: concurrent validations inside the refresh margin
/// wait on the same guard and observe the rotated tokens instead of calling the provider again.
#[derive(Clone)]
pub struct SessionManager {
	sessions: Arc<dyn SessionStore>,
	identities: Arc<dyn IdentityStore>,
	refresher: Arc<dyn TokenRefresher>,
	policy: SessionPolicy,
	refresh_guards: Arc<Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>>,
}
impl SessionManager {
	/// Builds a manager over the given stores.
	pub fn new(
		sessions: Arc<dyn SessionStore>,
		identities: Arc<dyn IdentityStore>,
		refresher: Arc<dyn TokenRefresher>,
		policy: SessionPolicy,
	) -> Self {
		Self { sessions, identities, refresher, policy, refresh_guards: Default::default() }
	}

	/// Replaces the refresher, keeping stores and guards.
	pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
		self.refresher = refresher;

		self
	}

	/// Active policy.
	pub fn policy(&self) -> SessionPolicy {
		self.policy
	}

	/// Issues a new session for an identity that has already been upserted.
	pub async fn create(
		&self,
		identity: &UserIdentity,
		tokens: TokenSet,
	) -> Result<(Session, SessionCookie)> {
		let now = OffsetDateTime::now_utc();
		let session = Session {
			id: SessionId::generate(),
			identity: identity.key(),
			tokens,
			issued_at: now,
			expires_at: self.policy.session_expires_at(now)?,
			last_refreshed_at: None,
			status: SessionStatus::Active,
		};

		<dyn SessionStore>::insert(self.sessions.as_ref(), session.clone()).await?;

		tracing::info!(
			provider = %identity.provider,
			provider_user_id = %identity.provider_user_id,
			"Session created."
		);

		let cookie = SessionCookie {
			value: session.id.expose().to_owned(),
			expires_at: session.expires_at,
			max_age: self.policy.session_ttl,
		};

		Ok((session, cookie))
	}

	/// Validates a session and returns its identity, refreshing tokens inside the margin.
	///
	/// Fails with [`Error::SessionNotFound`] for unknown ids and [`Error::SessionExpired`] once the
	/// session is terminal, past its lifetime, or its refresh failed.
	pub async fn validate(&self, id: &SessionId) -> Result<UserIdentity> {
		const KIND: FlowKind = FlowKind::SessionValidate;

		let span = FlowSpan::new(KIND, "validate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.in_span(self.validate_inner(id)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Removes a session. Unknown ids succeed.
	pub async fn destroy(&self, id: &SessionId) -> Result<()> {
		let removed = <dyn SessionStore>::remove(self.sessions.as_ref(), id).await?;

		self.refresh_guards.lock().remove(id);

		if removed.is_some() {
			tracing::info!("Session destroyed.");
		}

		Ok(())
	}

	/// Deletes expired sessions, returning how many were removed.
	pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<usize> {
		let purged = <dyn SessionStore>::purge_expired(self.sessions.as_ref(), now).await?;
		let mut guards = self.refresh_guards.lock();

		for id in &purged {
			guards.remove(id);
		}

		Ok(purged.len())
	}

	async fn validate_inner(&self, id: &SessionId) -> Result<UserIdentity> {
		let margin = self.policy.refresh_margin;
		let session = self.fetch_live(id, OffsetDateTime::now_utc()).await?;

		if !session.tokens.needs_refresh_at(OffsetDateTime::now_utc(), margin) {
			return self.identity_of(&session).await;
		}

		let guard = self.refresh_guard(id);
		let _singleflight = guard.lock().await;
		let now = OffsetDateTime::now_utc();
		// Another validation may have rotated the tokens while this one waited.
		let session = self.fetch_live(id, now).await?;

		if !session.tokens.needs_refresh_at(now, margin) {
			return self.identity_of(&session).await;
		}

		self.refresh_locked(session, now).await
	}

	async fn refresh_locked(&self, session: Session, now: OffsetDateTime) -> Result<UserIdentity> {
		let Some(expected) = session.tokens.refresh_token.as_ref().map(|s| s.expose().to_owned())
		else {
			if session.tokens.is_expired_at(now) {
				self.expire(&session.id, "access token expired without a refresh token").await?;

				return Err(Error::SessionExpired);
			}

			return self.identity_of(&session).await;
		};

		let sessions = self.sessions.as_ref();

		<dyn SessionStore>::set_status(sessions, &session.id, SessionStatus::Refreshing).await?;

		let refreshed =
			match self.refresher.refresh(&session.identity.provider, &session.tokens).await {
				Ok(tokens) => tokens,
				Err(err) => {
					tracing::warn!(
						provider = %session.identity.provider,
						error = %err,
						"Session refresh failed; expiring session."
					);
					self.expire(&session.id, "refresh failed").await?;

					return Err(Error::SessionExpired);
				},
			};
		let outcome = <dyn SessionStore>::compare_and_swap_tokens(
			self.sessions.as_ref(),
			&session.id,
			Some(expected.as_str()),
			refreshed,
			OffsetDateTime::now_utc(),
		)
		.await?;

		match outcome {
			CompareAndSwapOutcome::Updated => {
				tracing::debug!(provider = %session.identity.provider, "Session tokens rotated.");

				self.identity_of(&session).await
			},
			CompareAndSwapOutcome::RefreshMismatch => {
				// Rotated elsewhere; the stored tokens are newer than ours.
				<dyn SessionStore>::set_status(
					self.sessions.as_ref(),
					&session.id,
					SessionStatus::Active,
				)
				.await?;

				self.identity_of(&session).await
			},
			CompareAndSwapOutcome::Missing => Err(Error::SessionNotFound),
		}
	}

	async fn fetch_live(&self, id: &SessionId, now: OffsetDateTime) -> Result<Session> {
		let session = <dyn SessionStore>::fetch(self.sessions.as_ref(), id)
			.await?
			.ok_or(Error::SessionNotFound)?;

		if session.status == SessionStatus::Expired {
			return Err(Error::SessionExpired);
		}
		if session.is_expired_at(now) {
			self.expire(id, "session lifetime elapsed").await?;

			return Err(Error::SessionExpired);
		}

		Ok(session)
	}

	async fn identity_of(&self, session: &Session) -> Result<UserIdentity> {
		<dyn IdentityStore>::fetch_identity(self.identities.as_ref(), &session.identity)
			.await?
			.ok_or(Error::SessionNotFound)
	}

	async fn expire(&self, id: &SessionId, reason: &'static str) -> Result<()> {
		<dyn SessionStore>::set_status(self.sessions.as_ref(), id, SessionStatus::Expired).await?;

		self.refresh_guards.lock().remove(id);

		tracing::info!(reason, "Session expired.");

		Ok(())
	}

	fn refresh_guard(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl Debug for SessionManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("policy", &self.policy)
			.field("refresh_guards", &self.refresh_guards.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::{ProviderUserId, ScopeSet},
		error::ProviderError,
		store::MemoryStore,
	};

	#[derive(Default)]
	struct CountingRefresher {
		calls: AtomicUsize,
		fail: bool,
	}
	impl TokenRefresher for CountingRefresher {
		fn refresh<'a>(
			&'a self,
			_provider: &'a ProviderId,
			tokens: &'a TokenSet,
		) -> RefreshFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				tokio::time::sleep(std::time::Duration::from_millis(20)).await;

				if self.fail {
					return Err(Error::RefreshFailed(ProviderError::InvalidGrant {
						reason: "revoked".into(),
					}));
				}

				let renewed = TokenSet::builder(tokens.scope.clone())
					.access_token("renewed")
					.refresh_token("rotated")
					.expires_in(Duration::hours(6))
					.build()
					.map_err(|err| {
						Error::RefreshFailed(ProviderError::malformed(err.to_string()))
					})?;

				Ok(renewed)
			})
		}
	}

	fn identity() -> UserIdentity {
		UserIdentity {
			provider: ProviderId::new("fit").expect("Provider fixture should be valid."),
			provider_user_id: ProviderUserId::new("42").expect("User fixture should be valid."),
			name: Some("Ada Lovelace".into()),
			email: Some("ada@example.com".into()),
			avatar_url: None,
			raw_metadata: serde_json::json!({ "id": 42 }),
		}
	}

	fn tokens(expires_in: Duration, refresh: Option<&str>) -> TokenSet {
		let mut builder = TokenSet::builder(ScopeSet::default())
			.access_token("access")
			.expires_in(expires_in);

		if let Some(refresh) = refresh {
			builder = builder.refresh_token(refresh);
		}

		builder.build().expect("Token fixture should build.")
	}

	async fn manager(refresher: Arc<CountingRefresher>) -> (SessionManager, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());

		<dyn IdentityStore>::upsert(store.as_ref(), identity())
			.await
			.expect("Identity fixture should persist.");

		let manager =
			SessionManager::new(store.clone(), store.clone(), refresher, SessionPolicy::default());

		(manager, store)
	}

	#[tokio::test]
	async fn fresh_sessions_validate_without_refresh() {
		let refresher = Arc::new(CountingRefresher::default());
		let (manager, _) = manager(refresher.clone()).await;
		let (session, cookie) = manager
			.create(&identity(), tokens(Duration::hours(6), Some("r")))
			.await
			.expect("Session should be created.");

		assert_eq!(cookie.value, session.id.expose());
		assert_eq!(cookie.max_age, SessionPolicy::DEFAULT_SESSION_TTL);

		let validated = manager.validate(&session.id).await.expect("Session should be valid.");

		assert_eq!(validated.name.as_deref(), Some("Ada Lovelace"));
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn concurrent_validations_refresh_once() {
		let refresher = Arc::new(CountingRefresher::default());
		let (manager, store) = manager(refresher.clone()).await;
		let (session, _) = manager
			.create(&identity(), tokens(Duration::minutes(1), Some("r")))
			.await
			.expect("Session should be created.");
		let results = futures_join(&manager, &session.id, 8).await;

		assert!(results.iter().all(Result::is_ok));
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

		let stored = <dyn SessionStore>::fetch(store.as_ref(), &session.id)
			.await
			.expect("Fetch should succeed.")
			.expect("Session should exist.");

		assert_eq!(stored.status, SessionStatus::Active);
		assert_eq!(stored.tokens.access_token.expose(), "renewed");
		assert!(stored.last_refreshed_at.is_some());
	}

	#[tokio::test]
	async fn failed_refresh_expires_the_session() {
		let refresher = Arc::new(CountingRefresher { fail: true, ..Default::default() });
		let (manager, _) = manager(refresher.clone()).await;
		let (session, _) = manager
			.create(&identity(), tokens(Duration::minutes(1), Some("r")))
			.await
			.expect("Session should be created.");

		assert!(matches!(manager.validate(&session.id).await, Err(Error::SessionExpired)));
		assert!(matches!(manager.validate(&session.id).await, Err(Error::SessionExpired)));
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn expired_tokens_without_refresh_token_expire_the_session() {
		let refresher = Arc::new(CountingRefresher::default());
		let (manager, _) = manager(refresher.clone()).await;
		let (session, _) = manager
			.create(&identity(), tokens(Duration::seconds(1), None))
			.await
			.expect("Session should be created.");

		tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

		assert!(matches!(manager.validate(&session.id).await, Err(Error::SessionExpired)));
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn destroy_is_idempotent() {
		let refresher = Arc::new(CountingRefresher::default());
		let (manager, store) = manager(refresher).await;
		let (session, _) = manager
			.create(&identity(), tokens(Duration::hours(1), None))
			.await
			.expect("Session should be created.");

		manager.destroy(&session.id).await.expect("Destroy should succeed.");
		manager.destroy(&session.id).await.expect("Repeated destroy should succeed.");
		manager.destroy(&SessionId::generate()).await.expect("Unknown ids should succeed.");

		assert_eq!(store.session_count(), 0);
		assert!(matches!(manager.validate(&session.id).await, Err(Error::SessionNotFound)));
	}

	async fn futures_join(
		manager: &SessionManager,
		id: &SessionId,
		n: usize,
	) -> Vec<Result<UserIdentity>> {
		let handles = (0..n)
			.map(|_| {
				let manager = manager.clone();
				let id = id.clone();

				tokio::spawn(async move { manager.validate(&id).await })
			})
			.collect::<Vec<_>>();
		let mut results = Vec::with_capacity(n);

		for handle in handles {
			results.push(handle.await.expect("Validation task should not panic."));
		}

		results
	}
}
