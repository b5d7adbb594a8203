//! Normalized user identities and the rules that map provider user-info payloads into them.
//!
//! A [`ProfileMapping`] names dotted field paths (`athlete.id`, `emails.0.value`) inside the
//! user-info JSON. The identity field is mandatory; name, email, and avatar are best effort.
//! Several name paths are joined with a single space, skipping blanks, so `firstname` and
//! `lastname` become one display name.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ProviderUserId},
};

/// Field paths used to build a [`UserIdentity`] from a user-info payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileMapping {
	/// Path to the stable provider user identifier.
	pub id: String,
	/// Paths joined (space separated) into the display name.
	pub name: Vec<String>,
	/// Path to the email address.
	pub email: Option<String>,
	/// Path to the avatar URL.
	pub avatar: Option<String>,
}
impl ProfileMapping {
	/// Creates a mapping with only the identity field set.
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), name: Vec::new(), email: None, avatar: None }
	}

	/// Sets the name field paths.
	pub fn name_fields<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.name = fields.into_iter().map(Into::into).collect();

		self
	}

	/// Sets the email field path.
	pub fn email_field(mut self, field: impl Into<String>) -> Self {
		self.email = Some(field.into());

		self
	}

	/// Sets the avatar field path.
	pub fn avatar_field(mut self, field: impl Into<String>) -> Self {
		self.avatar = Some(field.into());

		self
	}
}
impl Default for ProfileMapping {
	/// OpenID Connect standard claims.
	fn default() -> Self {
		Self::new("sub").name_fields(["name"]).email_field("email").avatar_field("picture")
	}
}

/// Key under which identities are upserted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
	/// Provider that authenticated the user.
	pub provider: ProviderId,
	/// Stable identifier at that provider.
	pub provider_user_id: ProviderUserId,
}

/// Provider-independent identity exposed to the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Provider that authenticated the user.
	pub provider: ProviderId,
	/// Stable identifier at that provider.
	pub provider_user_id: ProviderUserId,
	/// Display name.
	pub name: Option<String>,
	/// Email address.
	pub email: Option<String>,
	/// Avatar URL.
	pub avatar_url: Option<String>,
	/// Raw user-info payload.
	pub raw_metadata: Value,
}
impl UserIdentity {
	/// Returns the upsert key.
	pub fn key(&self) -> IdentityKey {
		IdentityKey {
			provider: self.provider.clone(),
			provider_user_id: self.provider_user_id.clone(),
		}
	}
}

/// Outcome of an identity upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
	/// No identity existed for the key.
	Created,
	/// An existing identity was overwritten in place.
	Updated,
}

/// Maps a raw user-info payload into a [`UserIdentity`].
pub fn map_profile(
	provider: &ProviderId,
	mapping: &ProfileMapping,
	raw: Value,
) -> Result<UserIdentity> {
	let missing = || Error::MissingProviderUserId {
		provider: provider.clone(),
		field: mapping.id.clone(),
	};
	let provider_user_id = lookup_string(&raw, &mapping.id)
		.and_then(|value| ProviderUserId::new(value).ok())
		.ok_or_else(missing)?;
	let name_parts: Vec<String> =
		mapping.name.iter().filter_map(|path| lookup_string(&raw, path)).collect();
	let name = if name_parts.is_empty() { None } else { Some(name_parts.join(" ")) };
	let email = mapping.email.as_deref().and_then(|path| lookup_string(&raw, path));
	let avatar_url = mapping.avatar.as_deref().and_then(|path| lookup_string(&raw, path));

	Ok(UserIdentity {
		provider: provider.clone(),
		provider_user_id,
		name,
		email,
		avatar_url,
		raw_metadata: raw,
	})
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
	path.split('.').try_fold(value, |current, segment| match current {
		Value::Object(map) => map.get(segment),
		Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
		_ => None,
	})
}

fn lookup_string(value: &Value, path: &str) -> Option<String> {
	let text = match lookup(value, path)? {
		Value::String(text) => text.trim().to_owned(),
		Value::Number(number) => number.to_string(),
		Value::Bool(flag) => flag.to_string(),
		_ => return None,
	};

	if text.is_empty() { None } else { Some(text) }
}
