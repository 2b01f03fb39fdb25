//! Configuration for patchbay clients and relays.
//!
//! One TOML file holds three sections: `[client]` for `patchbay play`,
//! `[server]` for `patchbay serve`, and `[audio]` for the block clock.
//! Command-line flags override whatever the file says.
//!
//! # Example
//!
//! ```rust,no_run
//! use patchbay_config::{Config, default_config_path};
//!
//! let mut config = Config::load_or_default(default_config_path()).unwrap();
//! config.client.session = "rehearsal".to_string();
//! config.validate().unwrap();
//! config.save(default_config_path()).unwrap();
//! ```

mod config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

/// Range checks on configuration values.
pub mod validation;

pub use config::{AudioConfig, ClientConfig, Config, DEFAULT_PORT, ServerConfig};
pub use error::ConfigError;
pub use paths::{
    CONFIG_FILE, default_config_path, default_store_dir, ensure_user_config_dir, user_config_dir,
};
pub use validation::{MAX_VECTOR_SIZE, ValidationError, ValidationResult, validate_config};
