//! HTTP front end for the share index: search, refresh, status, and
//! range-aware downloads over axum.

pub mod config;
pub mod server;

pub use config::{AppConfig, ServerSettings};
pub use server::Server;
