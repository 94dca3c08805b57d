use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

/// Size of a SHA-256 digest in bytes
pub const DIGEST_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("invalid digest: {0}")]
    Invalid(String),
}

/// Content address of a header blob: the SHA-256 digest of its raw bytes.
///
/// Rendered as lowercase hex, which is also the blob's file name in the
/// header store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderDigest([u8; DIGEST_SIZE]);

impl HeaderDigest {
    /// Digest the given bytes
    pub fn of(bytes: &[u8]) -> Self {
        let hash = Sha256::digest(bytes);
        let mut buff = [0; DIGEST_SIZE];
        buff.copy_from_slice(&hash);
        Self(buff)
    }

    /// Parse a digest from a hexadecimal string
    pub fn from_hex(hex: &str) -> Result<Self, DigestError> {
        let mut buff = [0; DIGEST_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|e| DigestError::Invalid(format!("{}: {}", hex, e)))?;
        Ok(Self(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Display for HeaderDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HeaderDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeaderDigest({})", self.to_hex())
    }
}

impl FromStr for HeaderDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for HeaderDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HeaderDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
