//! API module
//!
//! This module provides the API functionality for orbitask, including the
//! server and the clients.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError, CoreClient, HttpClientImpl};
pub use server::{router, serve, ServerConfig};
