//! Content-addressed storage for Crypt4GH headers.
//!
//! Every blob lives in a single flat directory under the lowercase hex of its
//! SHA-256 digest. Blobs only become visible under that name through an
//! atomic rename of a fully written temporary file in the same directory, so
//! a reader never observes a blob whose bytes do not match its name.
//! Concurrent writers of the same content all rename bit-identical files onto
//! the same name, which needs no locking.

mod digest;

use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

pub use digest::{DigestError, HeaderDigest, DIGEST_SIZE};

/// Prefix of temporary files that have not been published yet.
pub const PENDING_PREFIX: &str = ".pending-";

/// Mode applied to every published blob (owner read/write only).
pub const BLOB_MODE: u32 = 0o600;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("header store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to publish header: {0}")]
    Persist(#[from] tempfile::PathPersistError),
    #[error("pending header was already written")]
    AlreadyWritten,
    #[error("refusing to publish an empty header")]
    EmptyBlob,
}

/// A header blob that has been allocated but not yet published.
///
/// The temporary file is removed when the handle is dropped without being
/// published.
#[derive(Debug)]
pub struct PendingHeader {
    temp: TempPath,
    written: bool,
}

impl PendingHeader {
    /// Location of the temporary file, for writers that produce the blob
    /// themselves (e.g. the recryption engine's output argument).
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Write the full blob. A handle can be written at most once.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        if self.written {
            return Err(StoreError::AlreadyWritten);
        }
        tokio::fs::write(&self.temp, bytes).await?;
        self.written = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HeaderStore {
    dir: PathBuf,
}

impl HeaderStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "opened header store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of the blob with the given digest.
    pub fn path(&self, digest: &HeaderDigest) -> PathBuf {
        self.dir.join(digest.to_hex())
    }

    /// Allocate a unique temporary file that is not visible under any
    /// content address.
    pub fn put_pending(&self) -> Result<PendingHeader, StoreError> {
        let temp = tempfile::Builder::new()
            .prefix(PENDING_PREFIX)
            .tempfile_in(&self.dir)?
            .into_temp_path();
        Ok(PendingHeader {
            temp,
            written: false,
        })
    }

    /// Publish a pending header under its content address.
    ///
    /// Returns the digest together with the published bytes. Publishing onto
    /// an existing digest replaces the file with identical content.
    pub async fn publish(
        &self,
        pending: PendingHeader,
    ) -> Result<(HeaderDigest, Vec<u8>), StoreError> {
        let bytes = tokio::fs::read(pending.path()).await?;
        if bytes.is_empty() {
            return Err(StoreError::EmptyBlob);
        }

        let digest = HeaderDigest::of(&bytes);
        tokio::fs::set_permissions(pending.path(), Permissions::from_mode(BLOB_MODE)).await?;

        let final_path = self.path(&digest);
        pending.temp.persist(&final_path)?;

        tracing::debug!(%digest, len = bytes.len(), "published header");
        Ok((digest, bytes))
    }

    /// Store externally supplied bytes and return their content address.
    pub async fn put(&self, bytes: &[u8]) -> Result<HeaderDigest, StoreError> {
        let mut pending = self.put_pending()?;
        pending.write(bytes).await?;
        let (digest, _) = self.publish(pending).await?;
        Ok(digest)
    }

    pub async fn get(&self, digest: &HeaderDigest) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path(digest)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, digest: &HeaderDigest) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.path(digest)).await?)
    }

    /// List the digests of all published blobs. Pending files are skipped.
    pub async fn digests(&self) -> Result<Vec<HeaderDigest>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut digests = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(digest) = name.to_str().and_then(|n| n.parse::<HeaderDigest>().ok()) {
                digests.push(digest);
            }
        }
        digests.sort();
        Ok(digests)
    }
}
