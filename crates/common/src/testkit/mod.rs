//! In-memory stand-in for the external recryption engine
//!
//! [`FakeEngine`] honors the same file-based contract as the real engine
//! without any cryptography: a "header" is a magic prefix, the recipient's
//! public key bytes and the session key in the clear. That is enough to
//! exercise every orchestration path (successful recryption, headers sealed
//! for someone else, engine crashes and hangs) and to check that a recrypted
//! header still carries the original session key.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testkit::{FakeEngine, seal_header, open_header};
//!
//! let engine = FakeEngine::new();
//! engine.generate_keypair(KeygenJob { .. }).await?;
//! let header = seal_header(&user_public_pem, b"session key")?;
//! ```

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::engine::{Engine, EngineError, KeygenJob, RecryptJob};
use crate::keypair::{armor_public_key, PublicKeyMaterial, PRIVATE_KEY_MODE};

/// PEM label of the fake private key files
pub const FAKE_PRIVATE_KEY_TAG: &str = "CRYPT4GH PRIVATE KEY";

const HEADER_MAGIC: &[u8] = b"fake-crypt4gh\x01";
const KEY_SIZE: usize = 32;

/// Canned behaviour for [`FakeEngine::recrypt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Recrypt for real (within the fake header format)
    Recrypt,
    /// Report that the header is not decryptable, whatever the input
    Undecryptable,
    /// Fail as if the engine exited with this status
    Exit(i32),
    /// Never finish
    Hang,
}

#[derive(Debug)]
pub struct FakeEngine {
    behavior: FakeBehavior,
    recrypt_calls: AtomicUsize,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_behavior(FakeBehavior::Recrypt)
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            recrypt_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `recrypt` invocations so far
    pub fn recrypt_calls(&self) -> usize {
        self.recrypt_calls.load(Ordering::SeqCst)
    }
}

fn public_from_secret(secret: &[u8]) -> Vec<u8> {
    Sha256::digest(secret).to_vec()
}

fn parse_private(armored: &str) -> Result<Vec<u8>, EngineError> {
    let pem = pem::parse(armored.trim()).map_err(|e| EngineError::Failed {
        code: Some(2),
        stderr: format!("invalid private key: {}", e),
    })?;
    if pem.tag() != FAKE_PRIVATE_KEY_TAG || pem.contents().len() != KEY_SIZE {
        return Err(EngineError::Failed {
            code: Some(2),
            stderr: "invalid private key".to_string(),
        });
    }
    Ok(pem.contents().to_vec())
}

fn parse_public(armored: &str) -> Result<Vec<u8>, EngineError> {
    PublicKeyMaterial::parse(armored)
        .map(|m| m.key_bytes().to_vec())
        .map_err(|e| EngineError::Failed {
            code: Some(2),
            stderr: e.to_string(),
        })
}

/// Build a fake header carrying `session_key` for the holder of `public_key`.
pub fn seal_header(public_key: &str, session_key: &[u8]) -> Result<Vec<u8>, EngineError> {
    let recipient = parse_public(public_key)?;
    let mut header = HEADER_MAGIC.to_vec();
    header.extend_from_slice(&recipient);
    header.extend_from_slice(session_key);
    Ok(header)
}

/// Recover the session key from a fake header with `private_key`.
pub fn open_header(private_key: &str, header: &[u8]) -> Result<Vec<u8>, EngineError> {
    let secret = parse_private(private_key)?;
    let undecryptable = || EngineError::Decryption {
        stderr: "header is not addressed to this key".to_string(),
    };

    let body = header.strip_prefix(HEADER_MAGIC).ok_or_else(undecryptable)?;
    if body.len() < KEY_SIZE {
        return Err(undecryptable());
    }
    let (recipient, session_key) = body.split_at(KEY_SIZE);
    if recipient != public_from_secret(&secret).as_slice() {
        return Err(undecryptable());
    }
    Ok(session_key.to_vec())
}

#[async_trait::async_trait]
impl Engine for FakeEngine {
    async fn recrypt(&self, job: RecryptJob<'_>) -> Result<(), EngineError> {
        self.recrypt_calls.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            FakeBehavior::Recrypt => {}
            FakeBehavior::Undecryptable => {
                return Err(EngineError::Decryption {
                    stderr: "canned decryption failure".to_string(),
                })
            }
            FakeBehavior::Exit(code) => {
                return Err(EngineError::Failed {
                    code: Some(code),
                    stderr: "canned engine failure".to_string(),
                })
            }
            FakeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }

        let private_key = tokio::fs::read_to_string(job.decryption_key).await?;
        let header = tokio::fs::read(job.input).await?;
        let session_key = open_header(&private_key, &header)?;

        let public_key = tokio::fs::read_to_string(job.encryption_key).await?;
        let recrypted = seal_header(&public_key, &session_key)?;
        tokio::fs::write(job.output, recrypted).await?;
        Ok(())
    }

    async fn generate_keypair(&self, job: KeygenJob<'_>) -> Result<(), EngineError> {
        let secret: [u8; KEY_SIZE] = rand::random();
        let private_pem = pem::encode(&pem::Pem::new(FAKE_PRIVATE_KEY_TAG, secret.to_vec()));
        let public_pem = armor_public_key(&public_from_secret(&secret));

        tokio::fs::write(job.private_key, private_pem).await?;
        tokio::fs::set_permissions(job.private_key, Permissions::from_mode(PRIVATE_KEY_MODE))
            .await?;
        tokio::fs::write(job.public_key, public_pem).await?;
        Ok(())
    }
}
