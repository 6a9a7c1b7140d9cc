//! HMAC-SHA256 webhook signatures.
//!
//! The platform signs each delivery with the channel secret and sends the
//! base64-encoded MAC in `X-Line-Signature`.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

fn mac_for(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// Sign `body` and return the base64-encoded signature.
pub fn sign(secret: &str, body: &[u8]) -> String {
    STANDARD.encode(mac_for(secret.as_bytes(), body).finalize().into_bytes())
}

/// Verify a base64 signature against `body` in constant time.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = match STANDARD.decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    mac_for(secret.as_bytes(), body)
        .verify_slice(&expected)
        .is_ok()
}
