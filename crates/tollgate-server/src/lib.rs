//! Tollgate HTTP server.
//!
//! Loads [`AppConfig`], wires the token service together under a
//! [`Supervisor`] and serves the OAuth endpoints plus `/healthz` and
//! `/readyz`.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ConfigLoadError, StorageBackend};
pub use server::{
    AppState, ServerBuilder, Supervisor, TollgateServer, build_app, with_transport_layers,
};
