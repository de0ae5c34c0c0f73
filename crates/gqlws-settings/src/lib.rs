//! # gqlws-settings
//!
//! Configuration for the graphql-ws server, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`GqlWsSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `GQLWS_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path};
pub use types::{GqlWsSettings, LogFormat, LoggingSettings, ServerSettings};
