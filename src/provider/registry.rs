//! Registry of configured providers.

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	error::ConfigError,
	provider::{DefaultProviderStrategy, ProviderConfig, ProviderStrategy},
};

#[derive(Clone)]
struct RegisteredProvider {
	config: Arc<ProviderConfig>,
	strategy: Arc<dyn ProviderStrategy>,
	enabled: bool,
}

/// Static set of providers the application can sign users in with.
///
/// Providers whose credentials are blank stay registered but disabled, so a misconfigured
/// provider fails its own flows with [`Error::ProviderDisabled`] without taking the others down.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
	providers: BTreeMap<ProviderId, RegisteredProvider>,
}
impl ProviderRegistry {
	/// Builds a registry from validated configurations, using the default strategy for each.
	pub fn new<I>(configs: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = ProviderConfig>,
	{
		let mut registry = Self::default();

		for config in configs {
			registry.register(config)?;
		}

		Ok(registry)
	}

	/// Registers one provider with the default strategy.
	pub fn register(&mut self, config: ProviderConfig) -> Result<(), ConfigError> {
		self.register_with_strategy(config, Arc::new(DefaultProviderStrategy))
	}

	/// Registers one provider with a custom error classification strategy.
	pub fn register_with_strategy(
		&mut self,
		config: ProviderConfig,
		strategy: Arc<dyn ProviderStrategy>,
	) -> Result<(), ConfigError> {
		if self.providers.contains_key(&config.id) {
			return Err(ConfigError::DuplicateProvider { provider: config.id });
		}

		let enabled = config.has_credentials();

		if enabled {
			tracing::info!(provider = %config.id, "Registered OAuth provider.");
		} else {
			tracing::warn!(
				provider = %config.id,
				"OAuth provider disabled because its client credentials are missing."
			);
		}

		self.providers.insert(
			config.id.clone(),
			RegisteredProvider { config: Arc::new(config), strategy, enabled },
		);

		Ok(())
	}

	/// Returns the configuration of an enabled provider.
	pub fn resolve(&self, provider: &str) -> Result<Arc<ProviderConfig>> {
		let entry = self
			.providers
			.get(provider)
			.ok_or_else(|| Error::UnknownProvider { provider: provider.to_owned() })?;

		if !entry.enabled {
			return Err(Error::ProviderDisabled { provider: entry.config.id.clone() });
		}

		Ok(entry.config.clone())
	}

	/// Returns the configuration regardless of the enabled flag.
	pub fn get(&self, provider: &str) -> Option<&Arc<ProviderConfig>> {
		self.providers.get(provider).map(|entry| &entry.config)
	}

	/// Returns the strategy registered for a provider, falling back to the default.
	pub fn strategy(&self, provider: &str) -> Arc<dyn ProviderStrategy> {
		self.providers
			.get(provider)
			.map(|entry| entry.strategy.clone())
			.unwrap_or_else(|| Arc::new(DefaultProviderStrategy))
	}

	/// Returns `true` if the provider is registered and enabled.
	pub fn is_enabled(&self, provider: &str) -> bool {
		self.providers.get(provider).is_some_and(|entry| entry.enabled)
	}

	/// Iterates over enabled provider identifiers.
	pub fn enabled(&self) -> impl Iterator<Item = &ProviderId> {
		self.providers.iter().filter(|(_, entry)| entry.enabled).map(|(id, _)| id)
	}

	/// Number of registered providers, including disabled ones.
	pub fn len(&self) -> usize {
		self.providers.len()
	}

	/// Returns `true` when no providers are registered.
	pub fn is_empty(&self) -> bool {
		self.providers.is_empty()
	}
}
impl Debug for ProviderRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_map()
			.entries(self.providers.iter().map(|(id, entry)| (id, entry.enabled)))
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config(id: &str, secret: &str) -> ProviderConfig {
		let url = |raw: &str| Url::parse(raw).expect("URL fixture should parse.");

		ProviderConfig::builder(ProviderId::new(id).expect("Provider fixture should be valid."))
			.credentials("client", secret)
			.authorization_endpoint(url("https://fit.example.com/oauth/authorize"))
			.token_endpoint(url("https://fit.example.com/oauth/token"))
			.user_info_endpoint(url("https://fit.example.com/api/me"))
			.redirect_uri(url("https://app.example.com/auth/callback"))
			.build()
			.expect("Provider fixture should build.")
	}

	#[test]
	fn resolve_distinguishes_unknown_and_disabled() {
		let registry = ProviderRegistry::new([config("fit", "secret"), config("blank", "")])
			.expect("Registry should build.");

		assert!(registry.resolve("fit").is_ok());
		assert!(matches!(registry.resolve("nope"), Err(Error::UnknownProvider { .. })));
		assert!(matches!(registry.resolve("blank"), Err(Error::ProviderDisabled { .. })));
		assert_eq!(registry.enabled().map(|id| id.as_ref()).collect::<Vec<_>>(), vec!["fit"]);
		assert_eq!(registry.len(), 2);
	}

	#[test]
	fn duplicate_providers_are_rejected() {
		let err = ProviderRegistry::new([config("fit", "a"), config("fit", "b")])
			.expect_err("Duplicate identifiers must be rejected.");

		assert!(matches!(err, ConfigError::DuplicateProvider { .. }));
	}
}
