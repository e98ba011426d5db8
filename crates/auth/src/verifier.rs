//! Bearer token verification.

use cdv_core::{CdvError, ErrorCode};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};

use crate::jwks::JwksClient;
use crate::token::Claims;

/// Whether the cryptographic signature is checked.
///
/// `Disabled` still enforces issuer, audience and expiry; it exists for test
/// harnesses only and cannot be selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureCheck {
    Enforced,
    Disabled,
}

/// The outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// The authenticated DID (`sub` claim).
    pub subject: String,
    pub claims: Claims,
}

/// Verifies bearer tokens against the issuer's JWKS.
pub struct TokenVerifier {
    jwks: JwksClient,
    issuer: String,
    audience: String,
    signature: SignatureCheck,
}

impl TokenVerifier {
    pub fn new(jwks: JwksClient, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
            signature: SignatureCheck::Enforced,
        }
    }

    /// A verifier that skips signature checks but still binds issuer,
    /// audience and expiry. For test harnesses only.
    pub fn insecure_for_tests(
        jwks: JwksClient,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
            signature: SignatureCheck::Disabled,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, CdvError> {
        let header = decode_header(token)
            .map_err(|_| CdvError::new(ErrorCode::JwtMalformed, "token is not a valid jwt"))?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;

        let decoding_key = match self.signature {
            SignatureCheck::Disabled => {
                validation.insecure_disable_signature_validation();
                DecodingKey::from_secret(&[])
            }
            SignatureCheck::Enforced => {
                let kid = header.kid.filter(|k| !k.is_empty()).ok_or_else(|| {
                    CdvError::new(ErrorCode::JwtMalformed, "missing kid in token header")
                })?;
                let jwk = self
                    .jwks
                    .key(&kid)
                    .await
                    .map_err(|err| {
                        tracing::warn!(error = %err, "signing key lookup failed");
                        CdvError::new(ErrorCode::JwtInvalid, "unable to load signing keys")
                    })?
                    .ok_or_else(|| CdvError::new(ErrorCode::JwtInvalid, "unknown signing key"))?;
                if jwk.kty != "OKP" || jwk.crv != "Ed25519" || jwk.alg != "EdDSA" {
                    return Err(CdvError::new(
                        ErrorCode::JwtInvalid,
                        "unsupported key type or algorithm",
                    ));
                }
                DecodingKey::from_ed_components(&jwk.x)
                    .map_err(|_| CdvError::new(ErrorCode::JwtInvalid, "invalid signing key"))?
            }
        };

        let token_data =
            decode::<Claims>(token, &decoding_key, &validation).map_err(map_jwt_error)?;

        let claims = token_data.claims;
        if claims.sub.is_empty() {
            return Err(CdvError::new(ErrorCode::JwtInvalid, "missing sub claim"));
        }

        Ok(VerifiedToken {
            subject: claims.sub.clone(),
            claims,
        })
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> CdvError {
    match err.kind() {
        ErrorKind::ExpiredSignature => CdvError::new(ErrorCode::JwtExpired, "token expired"),
        ErrorKind::InvalidIssuer => CdvError::new(ErrorCode::JwtInvalid, "invalid token issuer"),
        ErrorKind::InvalidAudience => {
            CdvError::new(ErrorCode::JwtInvalid, "invalid token audience")
        }
        ErrorKind::InvalidSignature => {
            CdvError::new(ErrorCode::JwtInvalid, "invalid token signature")
        }
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            CdvError::new(ErrorCode::JwtMalformed, "token is not a valid jwt")
        }
        _ => CdvError::new(ErrorCode::JwtInvalid, "token verification failed"),
    }
}
