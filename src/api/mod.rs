//! The API layer, containing web handlers and routing.

pub mod auth;
pub mod handlers;
pub mod payments;
pub mod router;
pub mod wallets;

pub use auth::{AuthUser, JwtAuthenticator, SupabaseClaims};
pub use handlers::{ApiDoc, SIGNATURE_HEADER};
pub use router::{RateLimitConfig, create_router, create_router_with_rate_limit};
