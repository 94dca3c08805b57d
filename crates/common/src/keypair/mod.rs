//! Tracking of the compute node's single rotating keypair.
//!
//! The keypair lives on disk as three files: the Crypt4GH private key, the
//! Crypt4GH public key and a small TOML metadata file carrying the id and
//! expiration fixed at generation time. Nothing is cached: every lookup
//! re-reads the files so an out-of-band rotation takes effect on the next
//! request without a restart.

mod expiration;
mod id;

use std::fs::Permissions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineError, KeygenJob};

pub use expiration::{parse_expiration, to_minute_iso, ExpirationParseError, MINUTE_FORMAT};
pub use id::{
    armor_public_key, KeypairId, PublicKeyMaterial, KEYPAIR_ID_HEX_LEN, KEYPAIR_ID_PREFIX,
    PUBLIC_KEY_TAG,
};

/// Mode applied to private key files
pub const PRIVATE_KEY_MODE: u32 = 0o600;

#[derive(Debug, thiserror::Error)]
pub enum KeypairError {
    #[error("keypair file is missing: {0}")]
    MissingFile(PathBuf),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid keypair metadata: {0}")]
    InvalidMetadata(#[from] toml::de::Error),
    #[error("failed to serialize keypair metadata: {0}")]
    SerializeMetadata(#[from] toml::ser::Error),
    #[error("keypair metadata belongs to {metadata} but the public key on disk is {on_disk}")]
    RotationInProgress {
        on_disk: KeypairId,
        metadata: KeypairId,
    },
    #[error("supplied public key {supplied} does not match the current compute key {current}")]
    Mismatch {
        current: KeypairId,
        supplied: KeypairId,
    },
    #[error("keypair generation failed: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to install rotated keypair: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("keypair i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contents of the keypair metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypairMetadata {
    pub id: KeypairId,
    pub expiration_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Public view of the current compute keypair. Never carries private key
/// material.
#[derive(Debug, Clone)]
pub struct KeypairInfo {
    pub id: KeypairId,
    pub public_key: PublicKeyMaterial,
    pub expiration: DateTime<Utc>,
}

impl KeypairInfo {
    /// Reported for information only; expired keypairs are never filtered
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

#[derive(Debug, Clone)]
pub struct ComputeKeypairManager {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
    metadata_path: PathBuf,
}

impl ComputeKeypairManager {
    pub fn new(
        private_key_path: impl Into<PathBuf>,
        public_key_path: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Only ever handed to the local recryption engine
    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    pub fn public_key_path(&self) -> &Path {
        &self.public_key_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Check that every keypair file is present.
    pub async fn ensure_provisioned(&self) -> Result<(), KeypairError> {
        for path in [
            &self.private_key_path,
            &self.public_key_path,
            &self.metadata_path,
        ] {
            if !tokio::fs::try_exists(path).await? {
                return Err(KeypairError::MissingFile(path.clone()));
            }
        }
        Ok(())
    }

    /// Read the keypair currently on disk.
    pub async fn current_keypair_info(&self) -> Result<KeypairInfo, KeypairError> {
        let armored = read_to_string(&self.public_key_path).await?;
        let public_key = PublicKeyMaterial::parse(&armored)?;
        let metadata = self.read_metadata().await?;

        let id = public_key.id();
        if metadata.id != id {
            return Err(KeypairError::RotationInProgress {
                on_disk: id,
                metadata: metadata.id,
            });
        }

        Ok(KeypairInfo {
            id,
            public_key,
            expiration: metadata.expiration_date,
        })
    }

    /// Answer a key-info query for `caller_public_key`.
    ///
    /// With `verify` set, the supplied key has to be the current public key.
    pub async fn key_info_for(
        &self,
        caller_public_key: &str,
        verify: bool,
    ) -> Result<KeypairInfo, KeypairError> {
        let info = self.current_keypair_info().await?;
        if verify {
            let supplied = PublicKeyMaterial::parse(caller_public_key)?;
            if !supplied.same_key(&info.public_key) {
                return Err(KeypairError::Mismatch {
                    current: info.id,
                    supplied: supplied.id(),
                });
            }
        }
        Ok(info)
    }

    /// Generate a fresh keypair with `engine` and swap it in place of the
    /// current one.
    ///
    /// The new files are generated in a staging directory next to the public
    /// key, then renamed over the live files. The metadata file goes last,
    /// so readers see either the old keypair, the new one, or a
    /// `RotationInProgress` error, never a mismatched id.
    pub async fn rotate<E>(
        &self,
        engine: &E,
        lifetime: Duration,
        passphrase: Option<&str>,
        comment: Option<&str>,
    ) -> Result<KeypairInfo, KeypairError>
    where
        E: Engine + ?Sized,
    {
        let key_dir = parent_dir(&self.public_key_path);
        tokio::fs::create_dir_all(key_dir).await?;
        tokio::fs::create_dir_all(parent_dir(&self.private_key_path)).await?;

        let staging = tempfile::Builder::new()
            .prefix(".rotate-")
            .tempdir_in(key_dir)?;
        let staged_private = staging.path().join("compute.sec");
        let staged_public = staging.path().join("compute.pub");

        engine
            .generate_keypair(KeygenJob {
                private_key: &staged_private,
                public_key: &staged_public,
                passphrase,
                comment,
            })
            .await?;

        let public_key = PublicKeyMaterial::parse(&read_to_string(&staged_public).await?)?;
        let created_at = Utc::now();
        let metadata = KeypairMetadata {
            id: public_key.id(),
            expiration_date: created_at + lifetime,
            created_at,
        };

        tokio::fs::set_permissions(&staged_private, Permissions::from_mode(PRIVATE_KEY_MODE))
            .await?;
        tokio::fs::rename(&staged_private, &self.private_key_path).await?;
        tokio::fs::rename(&staged_public, &self.public_key_path).await?;
        write_atomic(&self.metadata_path, toml::to_string_pretty(&metadata)?.as_bytes())?;

        tracing::info!(
            id = %metadata.id,
            expiration = %metadata.expiration_date,
            "compute keypair rotated"
        );

        Ok(KeypairInfo {
            id: metadata.id,
            public_key,
            expiration: metadata.expiration_date,
        })
    }

    async fn read_metadata(&self) -> Result<KeypairMetadata, KeypairError> {
        let raw = read_to_string(&self.metadata_path).await?;
        Ok(toml::from_str(&raw)?)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

async fn read_to_string(path: &Path) -> Result<String, KeypairError> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(KeypairError::MissingFile(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with `contents` through a rename from a sibling temp file.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), KeypairError> {
    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}
