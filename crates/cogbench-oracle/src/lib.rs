//! cogbench-oracle: semantic oracle backends and configuration.
//!
//! Implements the `SemanticOracle` trait for a remote NLI inference server,
//! plus offline and mock backends, and loads `cogbench.toml`.

pub mod config;
pub mod error;
pub mod fixed;
pub mod http;
pub mod mock;

pub use config::{create_oracle, load_config, load_config_from, CogbenchConfig, OracleConfig};
pub use error::BackendError;
