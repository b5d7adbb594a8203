//! Provider-agnostic OAuth 2.0 authorization-code sign-in with refreshed, origin-bound
//! application sessions.
//!
//! The [`flows::Broker`] ties the pieces together: a [`provider::ProviderRegistry`] describes
//! every configured provider, the authorization flow persists single-use state, the token client
//! exchanges codes and refreshes tokens, [`profile`] maps user-info payloads into a normalized
//! identity, and [`session::SessionManager`] issues sessions that refresh lazily on validation.
//! The optional `server` feature exposes the flow over HTTP.

#![deny(clippy::all)]
#![warn(missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod origin;
pub mod profile;
pub mod provider;
#[cfg(feature = "server")] pub mod server;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		flows::{Broker, BrokerStores},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		origin::TrustedOrigins,
		provider::ProviderRegistry,
		session::SessionPolicy,
		store::MemoryStore,
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Origin trusted by every broker built through [`build_reqwest_test_broker`].
	pub const TEST_ORIGIN: &str = "https://app.example.com";

	/// Builds a reqwest HTTP client with a short timeout for tests against `httpmock`.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		ReqwestHttpClient::with_timeout(std::time::Duration::from_secs(5))
			.expect("Failed to build Reqwest client for tests.")
	}

	/// Constructs a [`Broker`] backed by an in-memory store, the given registry, and the reqwest
	/// transport used across integration tests.
	pub fn build_reqwest_test_broker(
		registry: ProviderRegistry,
		policy: SessionPolicy,
	) -> (ReqwestTestBroker, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let origins =
			TrustedOrigins::new([TEST_ORIGIN]).expect("Test origin fixture should be valid.");
		let broker = Broker::with_http_client(
			registry,
			origins,
			BrokerStores::shared(store.clone()),
			policy,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		);

		(broker, store)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _, tracing_subscriber as _};
