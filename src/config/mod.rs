// src/config/mod.rs

//! Configuration loading and validation for buildgraph.
//!
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` turns a raw file into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
