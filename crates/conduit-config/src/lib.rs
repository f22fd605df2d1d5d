//! Configuration system for the Conduit connector control plane.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (user config dir + project-local overrides)
//! - Sections for the connector database, the definition catalog, caller
//!   identity lookup, and the embedded workflow engine
//! - Path resolution relative to the data directory

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, data_dir, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
