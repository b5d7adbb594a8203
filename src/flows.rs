//! Sign-in orchestration built around [`Broker`].

pub mod authorize;
pub mod callback;
pub mod client;
pub mod common;
pub mod lifecycle;
pub mod refresh;

pub use authorize::*;
pub use callback::*;
pub use client::*;
pub use lifecycle::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	origin::TrustedOrigins,
	provider::ProviderRegistry,
	session::{SessionManager, SessionPolicy},
	store::{IdentityStore, SessionStore, StateStore},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Broker specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Store handles injected into a [`Broker`].
#[derive(Clone)]
pub struct BrokerStores {
	/// Pending authorization states.
	pub states: Arc<dyn StateStore>,
	/// Application sessions.
	pub sessions: Arc<dyn SessionStore>,
	/// Normalized identities.
	pub identities: Arc<dyn IdentityStore>,
}
impl BrokerStores {
	/// Uses one backend for every contract.
	pub fn shared<S>(store: Arc<S>) -> Self
	where
		S: 'static + StateStore + SessionStore + IdentityStore,
	{
		Self { states: store.clone(), sessions: store.clone(), identities: store }
	}
}
impl Debug for BrokerStores {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("BrokerStores(..)")
	}
}

/// Process-wide entry point for sign-in, callback, session, and sweep operations.
///
/// Built once at startup from validated configuration. Every collaborator is shared through
/// `Arc`, so cloning a broker is cheap and clones observe the same stores and refresh guards.
pub struct Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) registry: Arc<ProviderRegistry>,
	pub(crate) origins: TrustedOrigins,
	pub(crate) policy: SessionPolicy,
	pub(crate) states: Arc<dyn StateStore>,
	pub(crate) identities: Arc<dyn IdentityStore>,
	pub(crate) token_client: Arc<TokenClient<C, M>>,
	pub(crate) sessions: SessionManager,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		registry: ProviderRegistry,
		origins: TrustedOrigins,
		stores: BrokerStores,
		policy: SessionPolicy,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let registry = Arc::new(registry);
		let token_client =
			Arc::new(TokenClient::new(registry.clone(), http_client.into(), mapper.into()));
		let sessions = SessionManager::new(
			stores.sessions,
			stores.identities.clone(),
			token_client.clone(),
			policy,
		);

		Self {
			registry,
			origins,
			policy,
			states: stores.states,
			identities: stores.identities,
			token_client,
			sessions,
		}
	}

	/// Replaces the refresh retry policy.
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		let token_client = Arc::new((*self.token_client).clone().with_retry_policy(retry));

		self.sessions = self.sessions.with_refresher(token_client.clone());
		self.token_client = token_client;

		self
	}

	/// Registered providers.
	pub fn registry(&self) -> &ProviderRegistry {
		&self.registry
	}

	/// Trusted origin allow-list.
	pub fn origins(&self) -> &TrustedOrigins {
		&self.origins
	}

	/// Lifetimes in force.
	pub fn policy(&self) -> SessionPolicy {
		self.policy
	}

	/// Session lifecycle manager.
	pub fn sessions(&self) -> &SessionManager {
		&self.sessions
	}

	/// Token endpoint client.
	pub fn token_client(&self) -> &TokenClient<C, M> {
		&self.token_client
	}

	/// Shared refresh counters.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.token_client.refresh_metrics()
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport bounded by `timeout`.
	pub fn new(
		registry: ProviderRegistry,
		origins: TrustedOrigins,
		stores: BrokerStores,
		policy: SessionPolicy,
		timeout: std::time::Duration,
	) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(timeout)?;

		Ok(Self::with_http_client(
			registry,
			origins,
			stores,
			policy,
			http_client,
			ReqwestTransportErrorMapper,
		))
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			registry: self.registry.clone(),
			origins: self.origins.clone(),
			policy: self.policy,
			states: self.states.clone(),
			identities: self.identities.clone(),
			token_client: self.token_client.clone(),
			sessions: self.sessions.clone(),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("registry", &self.registry)
			.field("origins", &self.origins)
			.field("policy", &self.policy)
			.field("sessions", &self.sessions)
			.finish()
	}
}
