//! Token endpoint and user-info client shared by the callback and refresh flows.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, Secret, TokenSet},
	flows::{RefreshMetrics, RetryPolicy},
	http::ProviderHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	provider::{ProviderConfig, ProviderRegistry},
	session::{RefreshFuture, TokenRefresher},
};

/// Calls provider endpoints through one transport, classifying failures per provider.
///
/// Code exchanges run exactly once. Refreshes retry transient failures according to the
/// configured [`RetryPolicy`].
pub struct TokenClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) registry: Arc<ProviderRegistry>,
	pub(crate) http_client: Arc<C>,
	pub(crate) transport_mapper: Arc<M>,
	pub(crate) retry: RetryPolicy,
	pub(crate) refresh_metrics: Arc<RefreshMetrics>,
}
impl<C, M> TokenClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client over the registry's providers with the default retry policy.
	pub fn new(registry: Arc<ProviderRegistry>, http_client: Arc<C>, mapper: Arc<M>) -> Self {
		Self {
			registry,
			http_client,
			transport_mapper: mapper,
			retry: RetryPolicy::default(),
			refresh_metrics: Default::default(),
		}
	}

	/// Replaces the refresh retry policy.
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Retry policy applied to refreshes.
	pub fn retry_policy(&self) -> RetryPolicy {
		self.retry
	}

	/// Shared refresh counters.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		&self.refresh_metrics
	}

	/// Exchanges an authorization code, failing with [`Error::TokenExchangeFailed`].
	pub async fn exchange_code(
		&self,
		config: &ProviderConfig,
		code: &str,
		pkce_verifier: Option<&Secret>,
	) -> Result<TokenSet> {
		let facade = self.facade(config)?;
		let strategy = self.registry.strategy(&config.id);

		facade
			.exchange_authorization_code(
				strategy.as_ref(),
				code,
				pkce_verifier.map(Secret::expose),
				&config.scopes,
			)
			.await
			.map_err(Error::TokenExchangeFailed)
	}

	/// Fetches the raw user-info payload, failing with [`Error::UserInfoFailed`].
	pub async fn fetch_user_info(
		&self,
		config: &ProviderConfig,
		tokens: &TokenSet,
	) -> Result<Value> {
		let facade = self.facade(config)?;
		let strategy = self.registry.strategy(&config.id);

		facade
			.fetch_user_info(strategy.as_ref(), tokens.access_token.expose())
			.await
			.map_err(Error::UserInfoFailed)
	}

	pub(crate) fn facade(&self, config: &ProviderConfig) -> Result<BasicFacade<C, M>> {
		Ok(BasicFacade::from_config(
			config,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?)
	}
}
impl<C, M> Clone for TokenClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			registry: self.registry.clone(),
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			retry: self.retry,
			refresh_metrics: self.refresh_metrics.clone(),
		}
	}
}
impl<C, M> Debug for TokenClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenClient")
			.field("registry", &self.registry)
			.field("retry", &self.retry)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish()
	}
}
impl<C, M> TokenRefresher for TokenClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(&'a self, provider: &'a ProviderId, tokens: &'a TokenSet) -> RefreshFuture<'a> {
		Box::pin(async move {
			let config = self
				.registry
				.get(provider)
				.cloned()
				.ok_or_else(|| Error::UnknownProvider { provider: provider.to_string() })?;

			self.refresh_tokens(&config, tokens).await
		})
	}
}
