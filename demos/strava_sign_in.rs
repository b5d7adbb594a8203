//! Serves the `/auth/*` routes for Strava sign-in on `127.0.0.1:3000`.
//!
//! ```sh
//! STRAVA_CLIENT_ID=... STRAVA_CLIENT_SECRET=... cargo run --example strava_sign_in
//! ```
//!
//! Set `OAUTH2_SESSION_SETTINGS` to a TOML file to override the built-in settings.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
// self
use oauth2_session::{
	config::Settings,
	flows::{Broker, BrokerStores},
	server::{self, AuthState},
	store::MemoryStore,
};

const DEFAULT_SETTINGS: &str = r#"
[cookie]
secure = false

[[providers]]
id = "strava"
preset = "strava"
"#;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let settings = match std::env::var("OAUTH2_SESSION_SETTINGS") {
		Ok(path) => Settings::load(path)?,
		Err(_) => Settings::from_toml_str(DEFAULT_SETTINGS)?,
	}
	.with_process_env();
	let store = Arc::new(MemoryStore::default());
	let broker = Broker::new(
		settings.provider_registry()?,
		settings.trusted_origins()?,
		BrokerStores::shared(store),
		settings.session_policy()?,
		settings.http_timeout(),
	)?
	.with_retry_policy(settings.retry_policy());
	let sweeper = broker.clone();

	tokio::spawn(async move {
		let mut interval = tokio::time::interval(SWEEP_INTERVAL);

		loop {
			interval.tick().await;

			if let Err(err) = sweeper.sweep_expired().await {
				tracing::warn!(error = %err, "Sweep failed.");
			}
		}
	});

	let app = server::router(AuthState::new(broker, settings.cookie.clone()));
	let listener = TcpListener::bind("127.0.0.1:3000").await?;

	tracing::info!(
		base_url = %settings.base_url()?,
		"Open /auth/sign-in?provider=strava to start."
	);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
		})
		.await?;

	Ok(())
}
