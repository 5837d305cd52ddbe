//! HTTP API.
//!
//! `api_router()` returns a composable `Router` over the shared
//! [`CoreState`](crate::core_state::CoreState); `start_server()` binds it
//! and serves it until shut down.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use router::api_router;
pub use server::{start_server, ApiServer, ServerError};
pub use types::ApiContext;
