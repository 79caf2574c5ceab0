//! Content fingerprints used for change detection.
//!
//! A fingerprint is the MD5 digest of a file's bytes. It is only ever compared for
//! equality against the fingerprint the object store reports; it carries no
//! integrity guarantee. Stores report digests in different encodings (Azure sends
//! base64 `Content-MD5`, others send hex), so both sides are reduced to the raw
//! 16 digest bytes, whose canonical rendering is lower-case hex.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint([u8; ContentFingerprint::LEN]);

impl ContentFingerprint {
    pub const LEN: usize = 16;

    pub fn of(bytes: &[u8]) -> Self {
        let digest = Md5::digest(bytes);
        let mut raw = [0u8; Self::LEN];
        raw.copy_from_slice(&digest);
        Self(raw)
    }

    /// Decode a fingerprint reported by a store. Accepts hex (any case) or
    /// standard base64; anything that does not decode to exactly 16 bytes is `None`.
    pub fn parse(encoded: &str) -> Option<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return None;
        }
        let raw = if encoded.len() == Self::LEN * 2 {
            hex::decode(encoded)
                .ok()
                .or_else(|| BASE64.decode(encoded).ok())?
        } else {
            BASE64.decode(encoded).ok()?
        };
        let raw: [u8; Self::LEN] = raw.try_into().ok()?;
        Some(Self(raw))
    }

    /// Canonical encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Encoding used by HTTP `Content-MD5` style headers.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentFingerprint({})", self.to_hex())
    }
}
