use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hmac-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Missing,
    Invalid,
    NotConfigured,
}

impl SignatureCheck {
    /// Under enforcement only a verified signature passes; a vendor without
    /// a secret cannot be authenticated at all.
    pub fn is_acceptable(self, enforce: bool) -> bool {
        match self {
            SignatureCheck::Valid => true,
            SignatureCheck::Missing | SignatureCheck::Invalid | SignatureCheck::NotConfigured => {
                !enforce
            }
        }
    }
}

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

pub fn check(secret: Option<&str>, payload: &[u8], signature: Option<&str>) -> SignatureCheck {
    let Some(secret) = secret else {
        return SignatureCheck::NotConfigured;
    };
    match signature {
        None => SignatureCheck::Missing,
        Some(signature) if verify(secret, payload, signature) => SignatureCheck::Valid,
        Some(_) => SignatureCheck::Invalid,
    }
}
