//! Axum router exposing the sign-in flow.
//!
//! | Route | Behavior |
//! | --- | --- |
//! | `GET /auth/sign-in?provider=<id>&redirect=<url>` | 302 to the provider consent URL |
//! | `GET /auth/callback?code=<c>&state=<s>` | sets the session cookie, 302 to the target |
//! | `GET /auth/session` | 200 with the identity, or 401 |
//! | `POST /auth/sign-out` | destroys the session, clears the cookie, 200 (403 cross-origin) |
//!
//! Failures never leak details: sign-in and callback errors redirect to the configured error
//! page with a coarse `error` category (`access_denied`, `invalid_request`,
//! `authentication_failed`).

// crates.io
use axum::{
	Json, Router,
	extract::{Query, State},
	http::{HeaderMap, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	config::CookieSettings,
	flows::ReqwestBroker,
	origin,
	profile::UserIdentity,
	session::SessionCookie,
};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Coarse failure category shown to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
	/// The user or provider declined consent.
	AccessDenied,
	/// The request was malformed, forged, replayed, or from an untrusted origin.
	InvalidRequest,
	/// The provider exchange or profile lookup failed.
	AuthenticationFailed,
}
impl ErrorCategory {
	/// Query value sent to the error page.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorCategory::AccessDenied => "access_denied",
			ErrorCategory::InvalidRequest => "invalid_request",
			ErrorCategory::AuthenticationFailed => "authentication_failed",
		}
	}

	/// Buckets a flow error.
	pub fn of(error: &Error) -> Self {
		match error {
			Error::InvalidState { .. }
			| Error::UntrustedOrigin { .. }
			| Error::UnknownProvider { .. }
			| Error::ProviderDisabled { .. } => ErrorCategory::InvalidRequest,
			_ => ErrorCategory::AuthenticationFailed,
		}
	}
}

/// Shared router state.
#[derive(Clone, Debug)]
pub struct AuthState {
	broker: Arc<ReqwestBroker>,
	cookie: Arc<CookieSettings>,
}
impl AuthState {
	/// Wraps a broker and cookie settings.
	pub fn new(broker: ReqwestBroker, cookie: CookieSettings) -> Self {
		Self { broker: Arc::new(broker), cookie: Arc::new(cookie) }
	}

	/// Underlying broker.
	pub fn broker(&self) -> &ReqwestBroker {
		&self.broker
	}

	fn session_cookie(&self, session: &SessionCookie) -> Cookie<'static> {
		Cookie::build((self.cookie.name.clone(), session.value.clone()))
			.http_only(true)
			.secure(self.cookie.secure)
			.same_site(SameSite::Lax)
			.path("/")
			.max_age(session.max_age)
			.build()
	}

	fn removal_cookie(&self) -> Cookie<'static> {
		Cookie::build((self.cookie.name.clone(), "")).path("/").build()
	}

	fn error_redirect(&self, category: ErrorCategory) -> Response {
		found(&error_location(&self.cookie.error_path, category))
	}
}

/// Builds the `/auth/*` routes.
pub fn router(state: AuthState) -> Router {
	Router::new()
		.route("/auth/sign-in", get(sign_in))
		.route("/auth/callback", get(callback))
		.route("/auth/session", get(current_session))
		.route("/auth/sign-out", post(sign_out))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
struct SignInQuery {
	provider: String,
	redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
	code: Option<String>,
	state: Option<String>,
	error: Option<String>,
}

async fn sign_in(
	State(state): State<AuthState>,
	headers: HeaderMap,
	Query(query): Query<SignInQuery>,
) -> Response {
	let origin = request_origin(&headers, state.cookie.secure);

	let started =
		state.broker.sign_in(origin.as_deref(), &query.provider, query.redirect.as_deref()).await;

	match started {
		Ok(request) => found(request.url.as_str()),
		Err(err) => {
			tracing::warn!(provider = %query.provider, error = %err, "Sign-in rejected.");

			state.error_redirect(ErrorCategory::of(&err))
		},
	}
}

async fn callback(
	State(state): State<AuthState>,
	headers: HeaderMap,
	jar: CookieJar,
	Query(query): Query<CallbackQuery>,
) -> Response {
	if let Some(error) = query.error.as_deref() {
		tracing::info!(error, "Provider returned an authorization error.");

		let category = if error == "access_denied" {
			ErrorCategory::AccessDenied
		} else {
			ErrorCategory::AuthenticationFailed
		};

		return state.error_redirect(category);
	}

	let (Some(code), Some(code_state)) = (query.code.as_deref(), query.state.as_deref()) else {
		return state.error_redirect(ErrorCategory::InvalidRequest);
	};
	let origin = request_origin(&headers, state.cookie.secure);

	match state.broker.complete_sign_in(origin.as_deref(), code, code_state).await {
		Ok(outcome) => {
			let jar = jar.add(state.session_cookie(&outcome.cookie));

			(jar, found(&outcome.redirect_to)).into_response()
		},
		Err(err) => {
			tracing::warn!(error = %err, "Callback rejected.");

			state.error_redirect(ErrorCategory::of(&err))
		},
	}
}

async fn current_session(State(state): State<AuthState>, jar: CookieJar) -> Response {
	let cookie = jar.get(&state.cookie.name).map(|cookie| cookie.value().to_owned());

	match state.broker.current_session(cookie.as_deref()).await {
		Ok(identity) => Json::<UserIdentity>(identity).into_response(),
		Err(Error::SessionNotFound) => StatusCode::UNAUTHORIZED.into_response(),
		Err(Error::SessionExpired) =>
			(jar.remove(state.removal_cookie()), StatusCode::UNAUTHORIZED).into_response(),
		Err(err) => {
			tracing::error!(error = %err, "Session lookup failed.");

			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		},
	}
}

async fn sign_out(
	State(state): State<AuthState>,
	headers: HeaderMap,
	jar: CookieJar,
) -> Response {
	let origin = request_origin(&headers, state.cookie.secure);

	if state.broker.origins().check(origin.as_deref()).is_err() {
		return StatusCode::FORBIDDEN.into_response();
	}

	let cookie = jar.get(&state.cookie.name).map(|cookie| cookie.value().to_owned());

	if let Err(err) = state.broker.sign_out(cookie.as_deref()).await {
		tracing::error!(error = %err, "Sign-out failed to remove the session.");
	}

	(jar.remove(state.removal_cookie()), StatusCode::OK).into_response()
}

/// Appends `error=<category>` to the error page, keeping any query it already has.
fn error_location(error_path: &str, category: ErrorCategory) -> String {
	let query = form_urlencoded::Serializer::new(String::new())
		.append_pair("error", category.as_str())
		.finish();
	let separator = match error_path.rfind('?') {
		None => "?",
		Some(index) if index + 1 == error_path.len() || error_path.ends_with('&') => "",
		Some(_) => "&",
	};

	format!("{error_path}{separator}{query}")
}

fn found(location: &str) -> Response {
	(StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

/// Origin of the request: the `Origin` header, else scheme plus `Host`.
///
/// Top-level navigations (the provider redirect) carry no `Origin`, so the host the browser
/// addressed stands in for it. An opaque `null` origin is treated as absent.
fn request_origin(headers: &HeaderMap, default_secure: bool) -> Option<String> {
	let header_value = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

	if let Some(value) = header_value(header::ORIGIN.as_str()).filter(|value| *value != "null") {
		return Some(origin::normalize_origin(value).unwrap_or_else(|| value.to_owned()));
	}

	let host = header_value(header::HOST.as_str())?;
	let scheme = header_value(FORWARDED_PROTO)
		.and_then(|value| value.split(',').next())
		.map(str::trim)
		.unwrap_or(if default_secure { "https" } else { "http" });

	origin::normalize_origin(&format!("{scheme}://{host}"))
}
