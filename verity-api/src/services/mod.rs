//! Service Layer
//!
//! Business logic behind the HTTP handlers. Services depend on the
//! [`verity_storage::RegistryStore`] trait, never on a concrete backend.

mod diploma;
mod identifier;
mod import;
pub mod rate_limit;
mod search;
mod stats;
pub mod verification;

pub use diploma::*;
pub use identifier::*;
pub use import::*;
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use search::*;
pub use stats::*;
pub use verification::{
    build_verifier, HumanVerifier, RecaptchaVerifier, StaticVerifier, VerificationConfig,
    VerificationOutcome,
};
