//! # Settings
//!
//! This crate loads the typed configuration for the Parkwatch application
//! from a config file (`db.*`, `gmaps.*`, `api.*`, `scrape.*` sections).

/// Configuration types and file loading.
mod settings;
pub use settings::*;
