//! Token claims and EdDSA token minting.
//!
//! Minting lives here for key tooling and test harnesses; the service itself
//! only verifies.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

/// Claims the vault requires in every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated DID.
    pub sub: String,
    pub iss: String,
    pub aud: String,
    /// Expiration, seconds since the Unix epoch.
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

/// Sign `claims` with an Ed25519 key, producing a compact JWT with the given
/// `kid` in its header.
pub fn sign_token(
    secret_key: &[u8; 32],
    kid: &str,
    claims: &Claims,
) -> Result<String, serde_json::Error> {
    let signing_key = SigningKey::from_bytes(secret_key);

    let header = serde_json::json!({"alg": "EdDSA", "typ": "JWT", "kid": kid});
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

    let message = format!("{header_b64}.{payload_b64}");
    let signature = signing_key.sign(message.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{message}.{signature_b64}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_token_has_three_parts() {
        let secret: [u8; 32] = [7; 32];
        let claims = Claims {
            sub: "did:ra:alice".into(),
            iss: "test-issuer".into(),
            aud: "test-audience".into(),
            exp: 4_000_000_000,
            iat: 0,
        };
        let token = sign_token(&secret, "key-1", &claims).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }
}
