use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::KeypairError;

/// PEM label of a Crypt4GH public key file
pub const PUBLIC_KEY_TAG: &str = "CRYPT4GH PUBLIC KEY";
/// Prefix of every compute keypair id
pub const KEYPAIR_ID_PREFIX: &str = "cn:";
/// Number of hex characters of the key fingerprint kept in the id
pub const KEYPAIR_ID_HEX_LEN: usize = 8;

/// Identifier of a compute keypair, derived from its public key.
///
/// `cn:` followed by the first eight hex characters of the SHA-256 of the
/// decoded public key bytes, e.g. `cn:b38ac81f`. Always recoverable from the
/// public key alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeypairId(String);

impl KeypairId {
    pub fn derive(key_bytes: &[u8]) -> Self {
        let fingerprint = fingerprint(key_bytes);
        Self(format!(
            "{}{}",
            KEYPAIR_ID_PREFIX,
            &fingerprint[..KEYPAIR_ID_HEX_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeypairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<KeypairId> for String {
    fn from(id: KeypairId) -> Self {
        id.0
    }
}

/// A parsed Crypt4GH public key, keeping the original armored text so it
/// can be forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    armored: String,
    key_bytes: Vec<u8>,
}

impl PublicKeyMaterial {
    pub fn parse(armored: &str) -> Result<Self, KeypairError> {
        let pem = pem::parse(armored.trim())
            .map_err(|e| KeypairError::InvalidPublicKey(e.to_string()))?;
        if pem.tag() != PUBLIC_KEY_TAG {
            return Err(KeypairError::InvalidPublicKey(format!(
                "unexpected PEM label '{}'",
                pem.tag()
            )));
        }
        if pem.contents().is_empty() {
            return Err(KeypairError::InvalidPublicKey("empty key".to_string()));
        }
        Ok(Self {
            armored: armored.to_string(),
            key_bytes: pem.contents().to_vec(),
        })
    }

    /// Armored text exactly as read from disk or received from a peer
    pub fn as_str(&self) -> &str {
        &self.armored
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    pub fn id(&self) -> KeypairId {
        KeypairId::derive(&self.key_bytes)
    }

    /// Full SHA-256 hex of the decoded key bytes
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.key_bytes)
    }

    /// Whether both materials encode the same key, ignoring armor formatting
    pub fn same_key(&self, other: &PublicKeyMaterial) -> bool {
        self.key_bytes == other.key_bytes
    }
}

fn fingerprint(key_bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(key_bytes))
}

/// Armor raw key bytes as a Crypt4GH public key file
pub fn armor_public_key(key_bytes: &[u8]) -> String {
    pem::encode(&pem::Pem::new(PUBLIC_KEY_TAG, key_bytes.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_prefixed_fingerprint() {
        let id = KeypairId::derive(&[7u8; 32]);
        assert!(id.as_str().starts_with(KEYPAIR_ID_PREFIX));
        assert_eq!(id.as_str().len(), KEYPAIR_ID_PREFIX.len() + KEYPAIR_ID_HEX_LEN);
        assert_eq!(id, KeypairId::derive(&[7u8; 32]));
        assert_ne!(id, KeypairId::derive(&[8u8; 32]));
    }

    #[test]
    fn test_parse_round_trips_armor() {
        let armored = armor_public_key(&[42u8; 32]);
        let material = PublicKeyMaterial::parse(&armored).unwrap();
        assert_eq!(material.key_bytes(), &[42u8; 32]);
        assert_eq!(material.as_str(), armored);
        assert_eq!(material.id(), KeypairId::derive(&[42u8; 32]));
        assert_eq!(material.fingerprint().len(), 64);
        assert!(material
            .id()
            .as_str()
            .ends_with(&material.fingerprint()[..KEYPAIR_ID_HEX_LEN]));
    }

    #[test]
    fn test_same_key_ignores_whitespace() {
        let armored = armor_public_key(&[1u8; 32]);
        let a = PublicKeyMaterial::parse(&armored).unwrap();
        let b = PublicKeyMaterial::parse(&format!("\n{}\n\n", armored)).unwrap();
        assert!(a.same_key(&b));
    }

    #[test]
    fn test_rejects_other_labels() {
        let private = pem::encode(&pem::Pem::new("CRYPT4GH PRIVATE KEY", vec![1u8; 32]));
        assert!(matches!(
            PublicKeyMaterial::parse(&private),
            Err(KeypairError::InvalidPublicKey(_))
        ));
        assert!(PublicKeyMaterial::parse("not a key").is_err());
    }
}
