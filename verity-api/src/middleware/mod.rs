//! Middleware modules for the Verity API
//!
//! - `auth`: session-cookie authentication for admin routes
//! - `rate_limit`: per-client flood protection in front of every route
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .nest("/api/v1/admin", admin_routes.layer(from_fn_with_state(auth, auth_middleware)))
//!     .layer(from_fn_with_state(flood_state, rate_limit_middleware))
//!     .layer(from_fn(observability_middleware))
//! ```

mod auth;
mod rate_limit;

pub use auth::{auth_middleware, extract_token, AdminExtractor};
pub use rate_limit::{
    client_address, rate_limit_middleware, ClientAddress, FloodLimitState, RateLimitError,
};
