//! Bindings to the external Crypt4GH recryption engine.
//!
//! The cryptographic transform is never done in-process. An [`Engine`]
//! takes file paths for the keys and headers and either writes the recrypted
//! header to the output path or reports why it could not.

mod command;

use std::path::Path;

pub use command::{CommandEngine, DEFAULT_ENGINE_PROGRAM};

/// Exit status the engine uses for "header not decryptable with this key"
pub const DECRYPTION_FAILURE_EXIT_CODE: i32 = 1;

/// Inputs of a single recryption.
#[derive(Debug, Clone, Copy)]
pub struct RecryptJob<'a> {
    /// Private key able to decrypt `input`
    pub decryption_key: &'a Path,
    /// Public key of the new recipient
    pub encryption_key: &'a Path,
    pub input: &'a Path,
    pub output: &'a Path,
}

/// Inputs of a keypair generation (provisioning only).
#[derive(Debug, Clone, Copy)]
pub struct KeygenJob<'a> {
    pub private_key: &'a Path,
    pub public_key: &'a Path,
    pub passphrase: Option<&'a str>,
    pub comment: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("header could not be decrypted with the supplied key")]
    Decryption { stderr: String },
    #[error("recryption engine failed with exit code {code:?}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("failed to launch recryption engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recryption engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
pub trait Engine: Send + Sync + std::fmt::Debug {
    /// Decrypt `job.input` with `job.decryption_key` and re-encrypt it for
    /// `job.encryption_key` into `job.output`.
    async fn recrypt(&self, job: RecryptJob<'_>) -> Result<(), EngineError>;

    /// Write a new keypair to `job.private_key` / `job.public_key`.
    async fn generate_keypair(&self, job: KeygenJob<'_>) -> Result<(), EngineError>;
}
