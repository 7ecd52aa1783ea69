// src/config/mod.rs

//! `Phasedag.toml` loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path, load_or_default};
pub use model::{CheckpointSection, ConfigFile, RawConfigFile, TaskConfig};
