//! HTTP surface for the boxes service: identity, policy-checked operations and
//! the axum router that exposes them.

pub mod auth;
pub mod error;
mod routes;
pub mod server;
pub mod service;

pub use auth::{Authenticator, StoreAuthenticator};
pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use service::BoxService;
