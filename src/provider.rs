//! Provider-facing configuration (data), registry, presets, and strategies (behavior).
//!
//! `config` exposes validated [`ProviderConfig`] values covering endpoints, client
//! credentials, scopes, extra authorization parameters, and the profile mapping used to turn
//! user-info payloads into identities. `registry` keeps every configured provider and
//! disables the ones whose credentials are missing. `presets` ships ready-made builders for
//! known providers. `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used
//! by the token client to decorate token requests and classify failures.

pub mod config;
pub mod presets;
pub mod registry;
pub mod strategy;

pub use config::*;
pub use registry::*;
pub use strategy::*;
