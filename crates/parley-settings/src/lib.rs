//! # parley-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`ParleySettings::default()`]
//! 2. **User file** — `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `PARLEY_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and hands
//! the relevant sections to the store and context manager.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    parley_home, settings_path,
};
pub use types::*;
