//! Token verification with remote key discovery.
//!
//! The vault accepts bearer tokens signed with Ed25519 (`alg=EdDSA`) by keys
//! the configured issuer advertises through its JWKS document. Verification
//! is bound to a single issuer, audience and algorithm; there is no algorithm
//! negotiation.

pub mod identity;
pub mod jwks;
pub mod token;
pub mod verifier;

pub use identity::{IdentityClient, IdentityError, IdentityRecord};
pub use jwks::{Jwk, Jwks, JwksClient};
pub use token::{Claims, sign_token};
pub use verifier::{TokenVerifier, VerifiedToken};
