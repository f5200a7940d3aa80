//! Client module
//!
//! This module provides clients for the orbitask engine: one over HTTP and one
//! that calls a [`Core`](crate::engine::Core) in the same process.

mod core;
mod http;
mod trait_def;

// Re-export the trait and types
pub use self::core::CoreClient;
pub use self::http::{ClientConfig, ClientError, HttpClientImpl};
pub use self::trait_def::Client;
