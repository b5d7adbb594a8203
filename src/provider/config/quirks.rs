// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how flows behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// PKCE must be supplied even for confidential clients.
	pub pkce_required: bool,
	/// Character used to join scopes in the `scope` parameter and to split granted scopes.
	pub scope_delimiter: char,
}
impl ProviderQuirks {
	/// Quirks for providers that expect comma-separated scopes.
	pub const fn comma_delimited() -> Self {
		Self { pkce_required: false, scope_delimiter: ',' }
	}
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { pkce_required: false, scope_delimiter: ' ' }
	}
}
