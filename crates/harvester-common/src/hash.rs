use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the hex HMAC-SHA256 of the uncompressed body.
pub const HASH_HEADER: &str = "HashSHA256";

/// Shared secret used to sign and verify batch payloads.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// An empty key means signing is disabled.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.into_bytes()))
        }
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(hmac_sha256(&self.0, payload))
    }

    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let computed = self.sign(payload);
        constant_time_eq(computed.as_bytes(), signature.trim().as_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    let max_len = a.len().max(b.len());

    for i in 0..max_len {
        let left = *a.get(i).unwrap_or(&0);
        let right = *b.get(i).unwrap_or(&0);
        diff |= usize::from(left ^ right);
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_disables_signing() {
        assert!(SigningKey::new("").is_none());
        assert!(SigningKey::new("k").is_some());
    }

    #[test]
    fn signature_matches_rfc4231_vector() {
        // RFC 4231 test case 2.
        let key = SigningKey::new("Jefe").unwrap();
        assert_eq!(
            key.sign(b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_rejects_modified_payload() {
        let key = SigningKey::new("k").unwrap();
        let body = br#"[{"id":"hits","type":"counter","delta":1}]"#;
        let signature = key.sign(body);
        assert!(key.verify(body, &signature));

        let mut tampered = body.to_vec();
        tampered[10] ^= 0x01;
        assert!(!key.verify(&tampered, &signature));
        assert!(!key.verify(body, &signature[..10]));
    }

    #[test]
    fn debug_output_hides_secret() {
        let key = SigningKey::new("topsecret").unwrap();
        assert_eq!(format!("{key:?}"), "SigningKey(..)");
    }
}
