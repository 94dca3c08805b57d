use std::path::PathBuf;
use std::sync::Arc;

use common::engine::{CommandEngine, Engine};
use common::keypair::{ComputeKeypairManager, KeypairError, PublicKeyMaterial};
use common::store::{HeaderStore, StoreError};

use crate::http_server::api::client::{ApiClient, ApiError};
use crate::http_server::health::{DataSource, DataSourceError};
use crate::recrypt::Recryptor;
use crate::service_config::{ComputeConfig, Config, UserConfig};

/// Shared state of a user node
#[derive(Debug, Clone)]
pub struct UserState {
    recryptor: Arc<Recryptor>,
}

impl UserState {
    pub fn new(recryptor: Recryptor) -> Self {
        Self {
            recryptor: Arc::new(recryptor),
        }
    }

    /// Wire up the store, engine and compute node client for a user node.
    ///
    /// Refuses to start without the user's keypair on disk.
    pub async fn from_config(config: &Config, user: &UserConfig) -> Result<Self, StateSetupError> {
        for path in [&user.private_key_path, &user.public_key_path] {
            if !tokio::fs::try_exists(path).await? {
                return Err(StateSetupError::MissingKeyFile(path.clone()));
            }
        }
        if !tokio::fs::try_exists(&user.compute_public_key_path).await? {
            tracing::warn!(
                path = %user.compute_public_key_path.display(),
                "compute public key not provisioned yet, recryption requests will fail"
            );
        }

        let store = HeaderStore::open(&user.headers_dir).await?;
        let engine: Arc<dyn Engine> = Arc::new(
            CommandEngine::new(&config.engine_program).verbose(config.dev_mode),
        );
        let client = ApiClient::with_options(
            &user.compute_url,
            user.root_ca.as_deref(),
            Some(user.network_timeout),
        )?;

        Ok(Self::new(Recryptor::new(
            store,
            engine,
            Arc::new(client),
            &user.private_key_path,
            &user.compute_public_key_path,
            config.engine_timeout,
        )))
    }

    pub fn recryptor(&self) -> &Recryptor {
        &self.recryptor
    }
}

#[async_trait::async_trait]
impl DataSource for UserState {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        let recryptor = self.recryptor();
        for path in [
            recryptor.store().dir(),
            recryptor.user_private_key(),
            recryptor.compute_public_key(),
        ] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                tracing::warn!(path = %path.display(), "user node dependency missing");
                return Err(DataSourceError::DependencyFailure);
            }
        }

        let armored = tokio::fs::read_to_string(recryptor.compute_public_key())
            .await
            .map_err(|_| DataSourceError::DependencyFailure)?;
        PublicKeyMaterial::parse(&armored).map_err(|e| {
            tracing::warn!(error = %e, "compute public key unusable");
            DataSourceError::DependencyFailure
        })?;
        Ok(())
    }
}

/// Shared state of a compute node
#[derive(Debug, Clone)]
pub struct ComputeState {
    keypairs: ComputeKeypairManager,
    verify_public_key: bool,
}

impl ComputeState {
    pub fn new(keypairs: ComputeKeypairManager, verify_public_key: bool) -> Self {
        Self {
            keypairs,
            verify_public_key,
        }
    }

    /// Refuses to start until a compute keypair has been generated.
    pub async fn from_config(compute: &ComputeConfig) -> Result<Self, StateSetupError> {
        let keypairs = ComputeKeypairManager::new(
            &compute.private_key_path,
            &compute.public_key_path,
            &compute.metadata_path,
        );
        keypairs.ensure_provisioned().await?;

        let info = keypairs.current_keypair_info().await?;
        tracing::info!(
            id = %info.id,
            expiration = %info.expiration,
            expired = info.is_expired_at(chrono::Utc::now()),
            verify_public_key = compute.verify_public_key,
            "serving compute keypair"
        );

        Ok(Self::new(keypairs, compute.verify_public_key))
    }

    pub fn keypairs(&self) -> &ComputeKeypairManager {
        &self.keypairs
    }

    pub fn verify_public_key(&self) -> bool {
        self.verify_public_key
    }
}

#[async_trait::async_trait]
impl DataSource for ComputeState {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        self.keypairs.current_keypair_info().await.map_err(|e| {
            tracing::warn!(error = %e, "compute keypair unavailable");
            DataSourceError::DependencyFailure
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("missing key file {0}, run `generate-keypair` first")]
    MissingKeyFile(PathBuf),
    #[error("header store error: {0}")]
    Store(#[from] StoreError),
    #[error("compute keypair error: {0}")]
    Keypair(#[from] KeypairError),
    #[error("failed to build compute node client: {0}")]
    Client(#[from] ApiError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::service_config::ModeConfig;
    use crate::state::AppState;

    #[tokio::test]
    async fn test_user_node_requires_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(temp_dir.path().join("svc")), None).unwrap();
        let config = Config::user(&state, None, None).unwrap();
        let ModeConfig::User(user) = &config.mode else {
            panic!("expected user mode");
        };

        assert!(matches!(
            UserState::from_config(&config, user).await,
            Err(StateSetupError::MissingKeyFile(_))
        ));
    }

    #[tokio::test]
    async fn test_compute_node_requires_keypair() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(temp_dir.path().join("svc")), None).unwrap();
        let config = Config::compute(&state, None, None).unwrap();
        let ModeConfig::Compute(compute) = &config.mode else {
            panic!("expected compute mode");
        };

        assert!(matches!(
            ComputeState::from_config(compute).await,
            Err(StateSetupError::Keypair(KeypairError::MissingFile(_)))
        ));
    }

    #[tokio::test]
    async fn test_user_readiness_tracks_compute_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let keys = temp_dir.path().join("keys");
        std::fs::create_dir_all(&keys).unwrap();
        std::fs::write(keys.join("user.sec"), "secret").unwrap();
        std::fs::write(keys.join("user.pub"), "public").unwrap();

        let user = UserConfig {
            headers_dir: temp_dir.path().join("headers"),
            private_key_path: keys.join("user.sec"),
            public_key_path: keys.join("user.pub"),
            compute_public_key_path: keys.join("compute.pub"),
            compute_url: Url::parse("https://localhost:8043").unwrap(),
            root_ca: None,
            network_timeout: Duration::from_secs(1),
        };
        let config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            engine_program: PathBuf::from("crypt4gh-recryptor"),
            engine_timeout: Duration::from_secs(1),
            dev_mode: false,
            mode: ModeConfig::User(user.clone()),
            log_level: tracing::Level::INFO,
            log_dir: None,
        };

        let state = UserState::from_config(&config, &user).await.unwrap();
        assert!(state.is_ready().await.is_err());

        std::fs::write(keys.join("compute.pub"), "public").unwrap();
        assert!(state.is_ready().await.is_err());

        std::fs::write(
            keys.join("compute.pub"),
            common::keypair::armor_public_key(&[9u8; 32]),
        )
        .unwrap();
        assert!(state.is_ready().await.is_ok());
    }
}
