//! HTTP transport: configuration, bearer auth, handlers, and shutdown control.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use auth::{AuthError, Authenticated, JwtAuthenticator, TokenClaims};
pub use config::*;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::*;
