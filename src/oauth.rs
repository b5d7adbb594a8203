//! OAuth client facade over the `oauth2` crate plus the bearer-authenticated user-info call.
//!
//! The facade turns a [`ProviderConfig`] into a configured `oauth2` client, runs the token
//! requests through the caller's [`ProviderHttpClient`], and classifies every failure into a
//! [`ProviderError`] with the provider's [`ProviderStrategy`].

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret,
	EndpointNotSet, EndpointSet, HttpClientError, HttpResponse, PkceCodeVerifier, RedirectUrl,
	RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION},
	},
};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSet},
	error::{ConfigError, ProviderError, TransientError, TransportError},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		ClientAuthMethod, ProviderCall, ProviderConfig, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a + Send>>;

/// Maps HTTP transport failures into [`ProviderError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		call: ProviderCall,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> ProviderError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		call: ProviderCall,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> ProviderError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(call, meta, *inner),
			HttpClientError::Http(inner) => TransportError::Request(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => transient(call, meta, message),
			_ => transient(call, meta, "unrecognized HTTP client failure"),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		pkce_verifier: Option<&'a str>,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenSet>;

	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		current: &'a TokenSet,
	) -> FacadeFuture<'a, TokenSet>;

	fn fetch_user_info<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		access_token: &'a str,
	) -> FacadeFuture<'a, Value>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	redirect_uri: RedirectUrl,
	user_info: Url,
	scope_delimiter: char,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &ProviderConfig,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(config.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let token_url = TokenUrl::new(config.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let redirect_uri = RedirectUrl::new(config.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		match config.client_auth_method {
			ClientAuthMethod::NoneWithPkce => {},
			ClientAuthMethod::ClientSecretBasic => {
				oauth_client = oauth_client
					.set_client_secret(ClientSecret::new(config.client_secret.expose().to_owned()));
			},
			ClientAuthMethod::ClientSecretPost => {
				oauth_client = oauth_client
					.set_client_secret(ClientSecret::new(config.client_secret.expose().to_owned()))
					.set_auth_type(AuthType::RequestBody);
			},
		}

		Ok(Self {
			oauth_client,
			redirect_uri,
			user_info: config.endpoints.user_info.clone(),
			scope_delimiter: config.quirks.scope_delimiter,
			http_client,
			error_mapper,
		})
	}

	fn extra_params(
		strategy: &dyn ProviderStrategy,
		call: ProviderCall,
	) -> BTreeMap<String, String> {
		let mut form = BTreeMap::new();

		strategy.augment_token_request(call, &mut form);

		form
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		pkce_verifier: Option<&'a str>,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenSet> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			const CALL: ProviderCall = ProviderCall::CodeExchange;

			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Borrowed(&self.redirect_uri));

			if let Some(verifier) = pkce_verifier {
				request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
			}
			for (name, value) in Self::extra_params(strategy, CALL) {
				request = request.add_extra_param(name, value);
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(strategy, CALL, meta.take(), err, self.error_mapper.as_ref())
			})?;

			map_token_response(requested_scope, self.scope_delimiter, &response)
		})
	}

	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		current: &'a TokenSet,
	) -> FacadeFuture<'a, TokenSet> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			const CALL: ProviderCall = ProviderCall::Refresh;

			let refresh_secret = current
				.refresh_token
				.as_ref()
				.map(|secret| RefreshToken::new(secret.expose().to_owned()))
				.ok_or_else(|| ProviderError::malformed("no refresh token is available"))?;
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for (name, value) in Self::extra_params(strategy, CALL) {
				request = request.add_extra_param(name, value);
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(strategy, CALL, meta.take(), err, self.error_mapper.as_ref())
			})?;

			Ok(map_token_response(&current.scope, self.scope_delimiter, &response)?
				.rotated(current))
		})
	}

	fn fetch_user_info<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		access_token: &'a str,
	) -> FacadeFuture<'a, Value> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			const CALL: ProviderCall = ProviderCall::UserInfo;

			let request = Request::builder()
				.method(Method::GET)
				.uri(self.user_info.as_str())
				.header(AUTHORIZATION, format!("Bearer {access_token}"))
				.header(ACCEPT, "application/json")
				.body(Vec::new())
				.map_err(TransportError::from)?;
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = instrumented.call(request).await.map_err(|err| {
				self.error_mapper.map_transport_error(CALL, meta.take().as_ref(), err)
			})?;
			let status = response.status().as_u16();

			if !response.status().is_success() {
				return Err(map_user_info_failure(strategy, meta.take(), &response));
			}

			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(
				response.body(),
			))
			.map_err(|source| ProviderError::ResponseParse { source, status: Some(status) })
		})
	}
}

fn map_token_response(
	requested_scope: &ScopeSet,
	delimiter: char,
	response: &BasicTokenResponse,
) -> Result<TokenSet, ProviderError> {
	let expires_in = response
		.expires_in()
		.ok_or_else(|| ProviderError::malformed("token response is missing expires_in"))?;
	let expires_in = i64::try_from(expires_in.as_secs())
		.map_err(|_| ProviderError::malformed("expires_in is out of range"))?;

	if expires_in <= 0 {
		return Err(ProviderError::malformed("expires_in must be positive"));
	}

	// Providers that omit `scope` granted what was requested.
	let scope = match response.scopes() {
		Some(scopes) => {
			let joined = scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" ");

			ScopeSet::parse_delimited(&joined, delimiter)
				.map_err(|_| ProviderError::malformed("granted scope is invalid"))?
		},
		None => requested_scope.clone(),
	};
	let mut builder = TokenSet::builder(scope)
		.access_token(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::seconds(expires_in));

	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|err| ProviderError::malformed(err.to_string()))
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	call: ProviderCall,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> ProviderError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, call, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(call, meta_ref, error),
		RequestTokenError::Parse(source, _body) => match meta_status(meta_ref) {
			Some(status @ (429 | 500..=599)) => TransientError::Endpoint {
				message: format!("{call} endpoint returned an unparseable {status} response"),
				status: Some(status),
				retry_after: meta_retry_after(meta_ref),
			}
			.into(),
			status => ProviderError::ResponseParse { source, status },
		},
		RequestTokenError::Other(message) => match meta_status(meta_ref) {
			None | Some(200..=299) => ProviderError::malformed(message),
			Some(status) => {
				let ctx = ProviderErrorContext::new(call)
					.with_http_status(status)
					.with_body_preview(message.clone());

				kind_to_error(strategy.classify_error(&ctx), message, meta_ref)
			},
		},
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	call: ProviderCall,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> ProviderError {
	let mut ctx =
		ProviderErrorContext::new(call).with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_string(),
	};

	kind_to_error(strategy.classify_error(&ctx), message, meta)
}

fn map_user_info_failure(
	strategy: &dyn ProviderStrategy,
	meta: Option<ResponseMetadata>,
	response: &HttpResponse,
) -> ProviderError {
	let status = response.status().as_u16();
	let body = String::from_utf8_lossy(response.body());
	let mut ctx = ProviderErrorContext::new(ProviderCall::UserInfo)
		.with_http_status(status)
		.with_body_preview(body.as_ref());

	if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(response.body()) {
		if let Some(error) = fields.get("error").and_then(Value::as_str) {
			ctx = ctx.with_oauth_error(error);
		}
		if let Some(description) = fields
			.get("error_description")
			.or_else(|| fields.get("message"))
			.and_then(Value::as_str)
		{
			ctx = ctx.with_error_description(description);
		}
	}

	let meta = meta.unwrap_or(ResponseMetadata { status: Some(status), retry_after: None });

	kind_to_error(
		strategy.classify_error(&ctx),
		format!("user-info endpoint returned HTTP {status}"),
		Some(&meta),
	)
}

fn kind_to_error(
	kind: ProviderErrorKind,
	reason: String,
	meta: Option<&ResponseMetadata>,
) -> ProviderError {
	match kind {
		ProviderErrorKind::InvalidGrant => ProviderError::InvalidGrant { reason },
		ProviderErrorKind::InvalidClient => ProviderError::InvalidClient { reason },
		ProviderErrorKind::InsufficientScope => ProviderError::InsufficientScope { reason },
		ProviderErrorKind::Transient => TransientError::Endpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn transient(
	call: ProviderCall,
	meta: Option<&ResponseMetadata>,
	detail: impl Display,
) -> ProviderError {
	TransientError::Endpoint {
		message: format!("HTTP client failed while calling the {call} endpoint: {detail}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	call: ProviderCall,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> ProviderError {
	if err.is_timeout() {
		return TransientError::Endpoint {
			message: format!("request to the {call} endpoint timed out"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
