/*
[INPUT]:  Canonical query string and API secret
[OUTPUT]: Hex-encoded HMAC-SHA256 signature
[POS]:    HTTP layer - request signing for authenticated endpoints
[UPDATE]: When changing signing algorithm or parameter canonicalisation
*/

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BinanceError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs query strings for SIGNED endpoints
#[derive(Clone)]
pub struct RequestSigner {
    secret: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl RequestSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// HMAC-SHA256 of `payload` keyed by the API secret, lowercase hex
    pub fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|err| {
            BinanceError::Authentication {
                message: format!("invalid signing key: {err}"),
            }
        })?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
