//! Trusted-origin allow-list guarding sign-in, callback, and post-login redirects.

// self
use crate::{_prelude::*, error::ConfigError};

const MISSING_ORIGIN: &str = "<missing>";

/// Normalized, de-duplicated set of origins allowed to drive the sign-in flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedOrigins(Arc<[String]>);
impl TrustedOrigins {
	/// Builds the allow-list, failing on malformed entries or an empty result.
	pub fn new<I, S>(values: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut origins: Vec<String> = Vec::new();

		for value in values {
			let raw = value.as_ref();

			if raw.trim().is_empty() {
				continue;
			}

			let origin = normalize_origin(raw)
				.ok_or_else(|| ConfigError::InvalidOrigin { value: raw.into() })?;

			if !origins.contains(&origin) {
				origins.push(origin);
			}
		}

		if origins.is_empty() {
			return Err(ConfigError::NoTrustedOrigins);
		}

		Ok(Self(Arc::from(origins)))
	}

	/// First configured origin; used as the base for relative redirects.
	pub fn primary(&self) -> &str {
		self.0.first().map(String::as_str).unwrap_or_default()
	}

	/// Iterates over the normalized origins.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Returns `true` if the origin normalizes to an allow-listed entry.
	pub fn contains(&self, origin: &str) -> bool {
		normalize_origin(origin).is_some_and(|normalized| self.0.contains(&normalized))
	}

	/// Rejects requests whose origin is missing or not allow-listed.
	pub fn check(&self, origin: Option<&str>) -> Result<()> {
		match origin {
			Some(origin) if self.contains(origin) => Ok(()),
			_ => {
				let origin = origin.unwrap_or(MISSING_ORIGIN).to_owned();

				tracing::warn!(%origin, reason = "origin_not_trusted", "Rejected sign-in request.");

				Err(Error::UntrustedOrigin { origin })
			},
		}
	}

	/// Validates a post-login redirect target.
	///
	/// Relative paths are accepted as-is; absolute URLs must point at a trusted origin. An empty
	/// target becomes `/`.
	pub fn validate_redirect(&self, target: Option<&str>) -> Result<String> {
		let target = target.map(str::trim).unwrap_or_default();

		if target.is_empty() {
			return Ok("/".into());
		}
		if is_local_path(target) {
			return Ok(target.to_owned());
		}

		let absolute = Url::parse(target).ok().filter(|url| {
			matches!(url.scheme(), "http" | "https") && self.contains(url.as_str())
		});

		match absolute {
			Some(url) => Ok(url.into()),
			None => {
				tracing::warn!(
					redirect = target,
					reason = "redirect_not_trusted",
					"Rejected redirect target."
				);

				Err(Error::UntrustedOrigin { origin: target.to_owned() })
			},
		}
	}
}

/// Normalizes a configured or observed origin to `scheme://host[:port]`.
///
/// Host-only values get an `https://` scheme; paths, trailing slashes, and default ports are
/// dropped.
pub fn normalize_origin(raw: &str) -> Option<String> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return None;
	}

	let candidate =
		if trimmed.contains("://") { trimmed.to_owned() } else { format!("https://{trimmed}") };
	let url = Url::parse(&candidate).ok()?;

	if !matches!(url.scheme(), "http" | "https") {
		return None;
	}

	let origin = url.origin();

	if origin.is_tuple() { Some(origin.ascii_serialization()) } else { None }
}

fn is_local_path(target: &str) -> bool {
	target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn origins_are_normalized_and_deduplicated() {
		let origins = TrustedOrigins::new([
			"https://app.example.com/",
			"app.example.com",
			"http://localhost:3000",
			"https://app.example.com:443/dashboard",
		])
		.expect("Origins should normalize.");

		assert_eq!(
			origins.iter().collect::<Vec<_>>(),
			vec!["https://app.example.com", "http://localhost:3000"]
		);
		assert_eq!(origins.primary(), "https://app.example.com");
	}

	#[test]
	fn empty_or_invalid_allow_lists_fail() {
		assert!(matches!(
			TrustedOrigins::new(Vec::<String>::new()),
			Err(ConfigError::NoTrustedOrigins)
		));
		assert!(matches!(TrustedOrigins::new(["  "]), Err(ConfigError::NoTrustedOrigins)));
		assert!(matches!(
			TrustedOrigins::new(["ftp://files.example.com"]),
			Err(ConfigError::InvalidOrigin { .. })
		));
	}

	#[test]
	fn check_rejects_unknown_and_missing_origins() {
		let origins =
			TrustedOrigins::new(["https://app.example.com"]).expect("Origins should build.");

		assert!(origins.check(Some("https://app.example.com")).is_ok());
		assert!(origins.check(Some("https://app.example.com/")).is_ok());
		assert!(matches!(
			origins.check(Some("https://evil.example.com")),
			Err(Error::UntrustedOrigin { .. })
		));
		assert!(matches!(
			origins.check(None),
			Err(Error::UntrustedOrigin { ref origin }) if origin == MISSING_ORIGIN
		));
		assert!(
			origins.check(Some("http://app.example.com")).is_err(),
			"Scheme is part of the origin."
		);
	}

	#[test]
	fn redirect_targets_must_stay_on_trusted_origins() {
		let origins =
			TrustedOrigins::new(["https://app.example.com"]).expect("Origins should build.");

		assert_eq!(origins.validate_redirect(None).expect("Default redirect."), "/");
		assert_eq!(
			origins.validate_redirect(Some("/dashboard?tab=1")).expect("Local path."),
			"/dashboard?tab=1"
		);
		assert_eq!(
			origins
				.validate_redirect(Some("https://app.example.com/welcome"))
				.expect("Trusted URL."),
			"https://app.example.com/welcome"
		);
		assert!(origins.validate_redirect(Some("//evil.example.com")).is_err());
		assert!(origins.validate_redirect(Some("https://evil.example.com/")).is_err());
		assert!(origins.validate_redirect(Some("javascript:alert(1)")).is_err());
	}
}
