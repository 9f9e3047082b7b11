//! `x-line-signature` verification: base64 HMAC-SHA256 of the raw body keyed by the channel secret.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature. Lookups must be case-insensitive.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

fn keyed_mac(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// Sign `body` with `secret` and return the base64 value expected in [`SIGNATURE_HEADER`].
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    STANDARD.encode(keyed_mac(secret, body).finalize().into_bytes())
}

/// True only when `signature` is standard base64 and decodes to exactly the HMAC-SHA256 of `body`.
///
/// Decode failures and length mismatches are folded into `false`. The digest comparison is
/// constant-time (`Mac::verify_slice`).
pub fn validate_signature(secret: &[u8], signature: &str, body: &[u8]) -> bool {
    let Ok(decoded) = STANDARD.decode(signature) else {
        return false;
    };
    keyed_mac(secret, body).verify_slice(&decoded).is_ok()
}
