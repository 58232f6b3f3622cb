//! Configuration module for the gateway
//!
//! YAML files and the process environment are both supported; see
//! [`ConfigLoader`].

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;
