// crates.io
use serde_json::json;
use time::{Duration, OffsetDateTime, macros};
// self
use oauth2_session::{
	auth::{ProviderId, ProviderUserId, ScopeSet, TokenSet},
	flows::AuthorizationState,
	profile::{UpsertOutcome, UserIdentity},
	session::{Session, SessionId, SessionStatus},
	store::{CompareAndSwapOutcome, IdentityStore, MemoryStore, SessionStore, StateStore},
};

const ISSUED: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

fn provider() -> ProviderId {
	ProviderId::new("fit").expect("Provider fixture should be valid.")
}

fn identity(name: &str) -> UserIdentity {
	UserIdentity {
		provider: provider(),
		provider_user_id: ProviderUserId::new("134815").expect("User id fixture should be valid."),
		name: Some(name.into()),
		email: None,
		avatar_url: None,
		raw_metadata: json!({ "id": 134815, "firstname": name }),
	}
}

fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
	let mut builder = TokenSet::builder(ScopeSet::new(["read"]).expect("Scopes should be valid."))
		.access_token(access)
		.issued_at(ISSUED)
		.expires_in(Duration::hours(6));

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Token fixture should build successfully.")
}

fn session(refresh: Option<&str>, expires_at: OffsetDateTime) -> Session {
	Session {
		id: SessionId::generate(),
		identity: identity("Marianne").key(),
		tokens: tokens("access-old", refresh),
		issued_at: ISSUED,
		expires_at,
		last_refreshed_at: None,
		status: SessionStatus::Active,
	}
}

fn state(value: &str, expires_at: OffsetDateTime) -> AuthorizationState {
	AuthorizationState {
		state: value.into(),
		provider: provider(),
		created_at: ISSUED,
		expires_at,
		code_verifier: None,
		redirect_target: "/".into(),
	}
}

#[tokio::test]
async fn states_are_consumed_at_most_once() {
	let store = MemoryStore::default();

	store
		.insert_state(state("abc", ISSUED + Duration::minutes(10)))
		.await
		.expect("Inserting a state should succeed.");

	let first = store.consume_state("abc").await.expect("Consume should succeed.");
	let second = store.consume_state("abc").await.expect("Consume should succeed.");

	assert_eq!(first.map(|state| state.provider), Some(provider()));
	assert!(second.is_none());
	assert_eq!(store.pending_states(), 0);
}

#[tokio::test]
async fn purge_states_drops_only_expired_entries() {
	let store = MemoryStore::default();

	for (value, ttl) in [("stale", Duration::minutes(1)), ("live", Duration::minutes(30))] {
		store.insert_state(state(value, ISSUED + ttl)).await.expect("Insert should succeed.");
	}

	let purged = store
		.purge_states(ISSUED + Duration::minutes(10))
		.await
		.expect("Purging states should succeed.");

	assert_eq!(purged, 1);
	assert!(store.consume_state("live").await.expect("Consume should succeed.").is_some());
}

#[tokio::test]
async fn token_swap_requires_the_expected_refresh_token() {
	let store = MemoryStore::default();
	let session = session(Some("refresh-old"), ISSUED + Duration::days(30));
	let id = session.id.clone();
	let refreshed_at = ISSUED + Duration::hours(5);

	store.insert(session).await.expect("Inserting a session should succeed.");

	let mismatch = store
		.compare_and_swap_tokens(&id, Some("refresh-other"), tokens("a", None), refreshed_at)
		.await
		.expect("CAS should run.");

	assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);

	store.set_status(&id, SessionStatus::Refreshing).await.expect("Status update should run.");

	let updated = store
		.compare_and_swap_tokens(
			&id,
			Some("refresh-old"),
			tokens("access-new", Some("refresh-new")),
			refreshed_at,
		)
		.await
		.expect("CAS should run.");

	assert_eq!(updated, CompareAndSwapOutcome::Updated);

	let stored = store
		.fetch(&id)
		.await
		.expect("Fetch should succeed.")
		.expect("Session should remain stored.");

	assert_eq!(stored.tokens.access_token.expose(), "access-new");
	assert_eq!(stored.status, SessionStatus::Active);
	assert_eq!(stored.last_refreshed_at, Some(refreshed_at));

	let missing = store
		.compare_and_swap_tokens(&SessionId::generate(), None, tokens("a", None), refreshed_at)
		.await
		.expect("CAS should run.");

	assert_eq!(missing, CompareAndSwapOutcome::Missing);
}

#[tokio::test]
async fn purge_expired_removes_tombstones_and_elapsed_sessions() {
	let store = MemoryStore::default();
	let live = session(Some("r"), ISSUED + Duration::days(30));
	let elapsed = session(Some("r"), ISSUED + Duration::hours(1));
	let tombstone = session(Some("r"), ISSUED + Duration::days(30));
	let live_id = live.id.clone();
	let tombstone_id = tombstone.id.clone();

	for session in [live, elapsed, tombstone] {
		store.insert(session).await.expect("Insert should succeed.");
	}

	assert!(
		store.set_status(&tombstone_id, SessionStatus::Expired).await.expect("Status should set.")
	);
	assert!(
		!store
			.set_status(&SessionId::generate(), SessionStatus::Expired)
			.await
			.expect("Status update should run.")
	);

	let purged = store
		.purge_expired(ISSUED + Duration::days(1))
		.await
		.expect("Purging sessions should succeed.");

	assert_eq!(purged.len(), 2);
	assert!(!purged.contains(&live_id));
	assert_eq!(store.session_count(), 1);
}

#[tokio::test]
async fn identity_upsert_overwrites_in_place() {
	let store = MemoryStore::default();
	let first = store.upsert(identity("Marianne")).await.expect("Upsert should succeed.");
	let second = store.upsert(identity("Marianne V.")).await.expect("Upsert should succeed.");

	assert_eq!(first, UpsertOutcome::Created);
	assert_eq!(second, UpsertOutcome::Updated);
	assert_eq!(store.identity_count(), 1);

	let stored = store
		.fetch_identity(&identity("ignored").key())
		.await
		.expect("Fetch should succeed.")
		.expect("Identity should be stored.");

	assert_eq!(stored.name.as_deref(), Some("Marianne V."));
}
