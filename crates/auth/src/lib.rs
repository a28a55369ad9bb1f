//! `stockflow-auth`: bearer-token verification for protected routes.
//!
//! Token issuance lives elsewhere; this crate only checks HS256 signatures and the
//! claim time window, then hands back the caller's identity.

pub mod claims;
pub mod validator;

pub use claims::{JwtClaims, TokenError, validate_claims};
pub use validator::{Hs256JwtValidator, JwtValidator};
