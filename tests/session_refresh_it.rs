#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
use tokio::task::JoinSet;
// self
use oauth2_session::{
	_preludet::*,
	auth::{ProviderId, ScopeSet, TokenSet},
	flows::{RefreshCounts, RetryPolicy, SignInOutcome},
	profile::ProfileMapping,
	provider::{ClientAuthMethod, ProviderConfig, ProviderRegistry},
	session::{SessionPolicy, SessionStatus},
	store::{MemoryStore, SessionStore},
};

const ACCESS: &str = "access-1";
const REFRESH: &str = "refresh-1";

fn registry(server: &MockServer) -> ProviderRegistry {
	let endpoint = |path: &str| Url::parse(&server.url(path)).expect("Mock endpoint should parse.");
	let config =
		ProviderConfig::builder(ProviderId::new("fit").expect("Provider id should be valid."))
			.credentials("fit-client", "fit-secret")
			.authorization_endpoint(endpoint("/authorize"))
			.token_endpoint(endpoint("/token"))
			.user_info_endpoint(endpoint("/me"))
			.redirect_uri(
				Url::parse("https://app.example.com/auth/callback")
					.expect("Redirect fixture should parse."),
			)
			.scopes(ScopeSet::new(["read"]).expect("Scopes should be valid."))
			.client_auth_method(ClientAuthMethod::ClientSecretPost)
			.profile(ProfileMapping::new("id").name_fields(["firstname"]))
			.build()
			.expect("Provider config should build successfully.");

	ProviderRegistry::new([config]).expect("Registry should accept the provider.")
}

/// Signs in once; the issued access token expires in `expires_in` seconds.
async fn signed_in(
	server: &MockServer,
	broker: &ReqwestTestBroker,
	expires_in: i64,
) -> SignInOutcome {
	let mut token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "authorization_code");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": ACCESS,
				"refresh_token": REFRESH,
				"token_type": "bearer",
				"expires_in": expires_in
			}));
		})
		.await;
	let mut user_info = server
		.mock_async(|when, then| {
			when.method(GET).path("/me");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "id": 7, "firstname": "Ada" }));
		})
		.await;
	let request =
		broker.begin_authorization("fit", None).await.expect("Authorization should start.");
	let outcome = broker
		.complete_sign_in(Some(TEST_ORIGIN), "code-1", &request.state)
		.await
		.expect("Callback should complete the sign-in.");

	token.delete_async().await;
	user_info.delete_async().await;

	outcome
}

async fn stored_tokens(store: &MemoryStore, outcome: &SignInOutcome) -> TokenSet {
	SessionStore::fetch(store, &outcome.session.id)
		.await
		.expect("Store fetch should succeed.")
		.expect("Session should still be stored.")
		.tokens
}

fn fast_retry() -> RetryPolicy {
	RetryPolicy {
		max_attempts: 3,
		initial_backoff: Duration::milliseconds(10),
		max_backoff: Duration::milliseconds(20),
	}
}

#[tokio::test]
async fn tokens_outside_the_margin_are_not_refreshed() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(registry(&server), SessionPolicy::default());
	let outcome = signed_in(&server, &broker, 21600).await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let identity = broker
		.current_session(Some(&outcome.cookie.value))
		.await
		.expect("Fresh session should validate.");

	assert_eq!(identity.name.as_deref(), Some("Ada"));
	assert_eq!(refresh.hits_async().await, 0);
}

#[tokio::test]
async fn concurrent_validations_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(registry(&server), SessionPolicy::default());
	let outcome = signed_in(&server, &broker, 60).await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", REFRESH)
				.form_urlencoded_tuple("client_secret", "fit-secret");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "access-2",
				"refresh_token": "refresh-2",
				"token_type": "bearer",
				"expires_in": 21600
			}));
		})
		.await;
	let mut tasks = JoinSet::new();

	for _ in 0..8 {
		let broker = broker.clone();
		let cookie = outcome.cookie.value.clone();

		tasks.spawn(async move { broker.current_session(Some(&cookie)).await });
	}
	while let Some(joined) = tasks.join_next().await {
		let identity = joined
			.expect("Validation task should not panic.")
			.expect("Every concurrent validation should succeed.");

		assert_eq!(identity.provider_user_id.as_ref(), "7");
	}

	refresh.assert_calls_async(1).await;

	let tokens = stored_tokens(&store, &outcome).await;

	assert_eq!(tokens.access_token.expose(), "access-2");
	assert_eq!(tokens.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-2"));
	assert_eq!(
		broker.refresh_metrics().snapshot(),
		RefreshCounts { attempts: 1, successes: 1, failures: 0 }
	);
}

#[tokio::test]
async fn rejected_refresh_expires_the_session() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(registry(&server), SessionPolicy::default());
	let outcome = signed_in(&server, &broker, 60).await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.json_body(json!({ "error": "invalid_grant" }));
		})
		.await;

	for _ in 0..2 {
		let err = broker
			.current_session(Some(&outcome.cookie.value))
			.await
			.expect_err("A revoked grant must end the session.");

		assert!(matches!(err, Error::SessionExpired));
	}

	refresh.assert_calls_async(1).await;

	let session = SessionStore::fetch(store.as_ref(), &outcome.session.id)
		.await
		.expect("Store fetch should succeed.")
		.expect("Expired sessions stay until swept.");

	assert_eq!(session.status, SessionStatus::Expired);

	let report = broker.sweep_expired().await.expect("Sweep should succeed.");

	assert_eq!(report.sessions, 1);
	assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn transient_refresh_failures_are_retried_then_expire() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(registry(&server), SessionPolicy::default());
	let broker = broker.with_retry_policy(fast_retry());
	let outcome = signed_in(&server, &broker, 60).await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503)
				.header("content-type", "application/json")
				.json_body(json!({ "error": "temporarily_unavailable" }));
		})
		.await;
	let err = broker
		.current_session(Some(&outcome.cookie.value))
		.await
		.expect_err("Exhausted retries must end the session.");

	assert!(matches!(err, Error::SessionExpired));
	refresh.assert_calls_async(3).await;
	assert_eq!(
		broker.refresh_metrics().snapshot(),
		RefreshCounts { attempts: 1, successes: 0, failures: 1 }
	);
}

#[tokio::test]
async fn refresh_without_rotation_keeps_the_previous_refresh_token() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(registry(&server), SessionPolicy::default());
	let outcome = signed_in(&server, &broker, 60).await;
	let _refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "access-2",
				"token_type": "bearer",
				"expires_in": 3600
			}));
		})
		.await;
	let refreshed = broker
		.refresh("fit", &outcome.session.tokens)
		.await
		.expect("Refresh grant should succeed.");

	assert_eq!(refreshed.access_token.expose(), "access-2");
	assert_eq!(refreshed.refresh_token.as_ref().map(|secret| secret.expose()), Some(REFRESH));
	assert!(refreshed.expires_at > outcome.session.tokens.expires_at);
}

#[tokio::test]
async fn elapsed_session_lifetime_expires_and_sweeps() {
	let server = MockServer::start_async().await;
	let policy = SessionPolicy::default().with_session_ttl(Duration::ZERO);
	let (broker, store) = build_reqwest_test_broker(registry(&server), policy);
	let outcome = signed_in(&server, &broker, 21600).await;

	assert!(matches!(
		broker.current_session(Some(&outcome.cookie.value)).await,
		Err(Error::SessionExpired)
	));

	let report = broker.sweep_expired().await.expect("Sweep should succeed.");

	assert_eq!(report.sessions, 1);
	assert_eq!(store.session_count(), 0);
	assert!(matches!(
		broker.current_session(Some(&outcome.cookie.value)).await,
		Err(Error::SessionNotFound)
	));
}

#[tokio::test]
async fn sign_out_is_idempotent() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(registry(&server), SessionPolicy::default());
	let outcome = signed_in(&server, &broker, 21600).await;

	broker.sign_out(Some(&outcome.cookie.value)).await.expect("Sign-out should succeed.");
	broker.sign_out(Some(&outcome.cookie.value)).await.expect("Repeated sign-out is a no-op.");
	broker.sign_out(None).await.expect("Sign-out without a cookie is a no-op.");

	assert_eq!(store.session_count(), 0);
	assert!(matches!(
		broker.current_session(Some(&outcome.cookie.value)).await,
		Err(Error::SessionNotFound)
	));
	assert!(matches!(broker.current_session(Some("garbage")).await, Err(Error::SessionNotFound)));
}
