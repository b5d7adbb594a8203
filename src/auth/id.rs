//! Strongly typed identifiers for providers and the users they authenticate.
//!
//! Provider identifiers are slugs (`strava`, `google-workspace`) because they double as URL query
//! values and environment variable prefixes. Provider user identifiers are opaque: whatever the
//! provider returns, as long as it has no whitespace or control characters.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const PROVIDER_ID_MAX_LEN: usize = 64;
const PROVIDER_USER_ID_MAX_LEN: usize = 255;

macro_rules! def_id {
	($name:ident, $kind:literal, $validate:path, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates and wraps the value.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let value = value.as_ref();

				$validate($kind, value)?;

				Ok(Self(value.to_owned()))
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$validate($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", $kind, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

def_id! {
	ProviderId,
	"Provider",
	validate_slug,
	"Identifier of a registered OAuth provider: lowercase ASCII letters, digits, `-`, and `_`."
}
def_id! {
	ProviderUserId,
	"ProviderUser",
	validate_opaque,
	"Stable identifier the provider assigns to an end user."
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// `Provider` or `ProviderUser`.
		kind: &'static str,
	},
	/// The identifier contains a character its kind does not allow.
	#[error("{kind} identifier contains the disallowed character {character:?}.")]
	InvalidCharacter {
		/// `Provider` or `ProviderUser`.
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The identifier exceeded the allowed length in bytes.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// `Provider` or `ProviderUser`.
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

fn validate_slug(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
	check_shape(kind, value, PROVIDER_ID_MAX_LEN, |c| {
		c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_')
	})
}

fn validate_opaque(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
	check_shape(kind, value, PROVIDER_USER_ID_MAX_LEN, |c| {
		!c.is_whitespace() && !c.is_control()
	})
}

fn check_shape(
	kind: &'static str,
	value: &str,
	max: usize,
	allowed: impl Fn(char) -> bool,
) -> Result<(), IdentifierError> {
	if value.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if let Some(character) = value.chars().find(|c| !allowed(*c)) {
		return Err(IdentifierError::InvalidCharacter { kind, character });
	}
	if value.len() > max {
		return Err(IdentifierError::TooLong { kind, max });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn provider_ids_are_lowercase_slugs() {
		let provider = ProviderId::new("google-workspace").expect("Slug should be valid.");

		assert_eq!(provider.as_ref(), "google-workspace");
		assert_eq!(format!("{provider:?}"), "Provider(google-workspace)");
		assert!(matches!(
			ProviderId::new("Strava"),
			Err(IdentifierError::InvalidCharacter { character: 'S', .. })
		));
		assert!(ProviderId::new(" strava").is_err());
		assert!(ProviderId::new("").is_err());
		assert!(ProviderId::new("a".repeat(PROVIDER_ID_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn provider_user_ids_accept_opaque_values() {
		for value in ["134815", "auth0|5f7c8ec7c33c6c004bbafe82", "user@example.com"] {
			ProviderUserId::new(value).expect("Opaque identifiers should be accepted.");
		}

		assert!(ProviderUserId::new("with space").is_err());
		assert!(ProviderUserId::new(format!("tab{}", '\u{00A0}')).is_err());
		assert!(ProviderUserId::new("line\nbreak").is_err());
	}

	#[test]
	fn deserialization_runs_validation() {
		let user: ProviderUserId =
			serde_json::from_str("\"134815\"").expect("User id should deserialize successfully.");

		assert_eq!(user.as_ref(), "134815");
		assert!(serde_json::from_str::<ProviderId>("\"Not A Slug\"").is_err());
	}

	#[test]
	fn borrow_supports_str_lookup() {
		let map: HashMap<ProviderId, u8> = HashMap::from_iter([(
			ProviderId::new("fit").expect("Provider used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("fit"), Some(&7));
	}
}
