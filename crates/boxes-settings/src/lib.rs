//! # boxes-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BoxesSettings::default()`]
//! 2. **Settings file**: `~/.boxes/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `BOXES_*` overrides (highest priority)
//!
//! The rule thresholds live in the `rules` section and are handed to the rule
//! checker as a single immutable [`boxes_core::RuleLimits`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, boxes_home, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
