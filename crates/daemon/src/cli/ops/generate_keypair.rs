use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;

use clap::Args;

use common::engine::{CommandEngine, Engine, EngineError, KeygenJob};
use common::keypair::{
    to_minute_iso, ComputeKeypairManager, KeypairError, PublicKeyMaterial, PRIVATE_KEY_MODE,
};
use recryptor_service::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct GenerateKeypair {
    /// Generate the user keypair instead of rotating the compute keypair
    #[arg(long)]
    pub user: bool,

    /// Overwrite an existing user keypair
    #[arg(long, requires = "user")]
    pub force: bool,

    /// Lifetime of a new compute keypair in hours (default from config)
    #[arg(long, conflicts_with = "user")]
    pub lifetime_hours: Option<u32>,

    /// Passphrase protecting the private key
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Comment stored with the key
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateKeypairError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("keypair error: {0}")]
    Keypair(#[from] KeypairError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("user keypair already exists at {0}, pass --force to replace it")]
    AlreadyExists(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for GenerateKeypair {
    type Error = GenerateKeypairError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let engine = CommandEngine::new(&state.config.engine.program)
            .verbose(state.config.engine.dev_mode);

        if self.user {
            return self.generate_user(&state, &engine).await;
        }

        let lifetime_hours = self
            .lifetime_hours
            .unwrap_or(state.config.compute.keypair_lifetime_hours);
        let manager = ComputeKeypairManager::new(
            state.compute_private_key_path(),
            state.compute_public_key_path(),
            state.compute_keypair_metadata_path(),
        );
        let info = manager
            .rotate(
                &engine,
                chrono::Duration::hours(i64::from(lifetime_hours)),
                self.passphrase.as_deref(),
                self.comment.as_deref(),
            )
            .await?;

        Ok(format!(
            "compute keypair {} expires {}\n  public key: {}",
            info.id,
            to_minute_iso(&info.expiration),
            manager.public_key_path().display()
        ))
    }
}

impl GenerateKeypair {
    async fn generate_user(
        &self,
        state: &AppState,
        engine: &dyn Engine,
    ) -> Result<String, GenerateKeypairError> {
        let private_key = state.user_private_key_path();
        let public_key = state.user_public_key_path();

        if !self.force && (private_key.exists() || public_key.exists()) {
            return Err(GenerateKeypairError::AlreadyExists(
                private_key.display().to_string(),
            ));
        }

        engine
            .generate_keypair(KeygenJob {
                private_key: &private_key,
                public_key: &public_key,
                passphrase: self.passphrase.as_deref(),
                comment: self.comment.as_deref(),
            })
            .await?;
        tokio::fs::set_permissions(&private_key, Permissions::from_mode(PRIVATE_KEY_MODE)).await?;

        let armored = tokio::fs::read_to_string(&public_key).await?;
        let material = PublicKeyMaterial::parse(&armored)?;
        Ok(format!(
            "user keypair written\n  private key: {}\n  public key:  {}\n  fingerprint: {}",
            private_key.display(),
            public_key.display(),
            material.fingerprint()
        ))
    }
}
