//! # gatelink-core
//!
//! Configuration, error types, and small utilities shared by the Gatelink
//! crates:
//!
//! - **Configuration**: loading, validating, and persisting the client config
//! - **Secrets**: a zeroizing string type for the gateway bearer credential
//! - **Utilities**: path resolution, environment helpers, and id generation

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod secret;

pub use config::ClientConfig;
pub use error::{ConfigError, Result};
pub use secret::SecretString;
