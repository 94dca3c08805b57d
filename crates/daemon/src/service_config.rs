use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Config {
    /// address for the HTTP server to listen on
    pub listen_addr: SocketAddr,

    // engine configuration
    pub engine_program: PathBuf,
    pub engine_timeout: Duration,
    /// log engine stdout/stderr at debug level
    pub dev_mode: bool,

    /// which node this process runs as
    pub mode: ModeConfig,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ModeConfig {
    User(UserConfig),
    Compute(ComputeConfig),
}

#[derive(Debug, Clone)]
pub struct UserConfig {
    pub headers_dir: PathBuf,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// the compute node's public key, provisioned out of band
    pub compute_public_key_path: PathBuf,
    pub compute_url: Url,
    /// extra root certificate (PEM) for the compute node
    pub root_ca: Option<Vec<u8>>,
    pub network_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub metadata_path: PathBuf,
    pub verify_public_key: bool,
}

impl Config {
    /// Resolve a user node configuration from the service directory
    pub fn user(
        state: &AppState,
        port: Option<u16>,
        log_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let section = &state.config.user;
        let mode = ModeConfig::User(UserConfig {
            headers_dir: state.headers_path.clone(),
            private_key_path: state.user_private_key_path(),
            public_key_path: state.user_public_key_path(),
            compute_public_key_path: state.compute_public_key_path(),
            compute_url: section.compute_url.clone(),
            root_ca: state.load_root_ca()?,
            network_timeout: Duration::from_secs(section.network_timeout_secs),
        });

        Ok(Self::with_mode(
            state,
            SocketAddr::new(section.host, port.unwrap_or(section.port)),
            mode,
            log_dir,
        ))
    }

    /// Resolve a compute node configuration from the service directory
    pub fn compute(
        state: &AppState,
        port: Option<u16>,
        log_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let section = &state.config.compute;
        let mode = ModeConfig::Compute(ComputeConfig {
            private_key_path: state.compute_private_key_path(),
            public_key_path: state.compute_public_key_path(),
            metadata_path: state.compute_keypair_metadata_path(),
            verify_public_key: section.verify_public_key,
        });

        Ok(Self::with_mode(
            state,
            SocketAddr::new(section.host, port.unwrap_or(section.port)),
            mode,
            log_dir,
        ))
    }

    fn with_mode(
        state: &AppState,
        listen_addr: SocketAddr,
        mode: ModeConfig,
        log_dir: Option<PathBuf>,
    ) -> Self {
        let engine = &state.config.engine;
        let log_level = if engine.dev_mode {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        Self {
            listen_addr,
            engine_program: engine.program.clone(),
            engine_timeout: Duration::from_secs(engine.timeout_secs),
            dev_mode: engine.dev_mode,
            mode,
            log_level,
            log_dir,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            ModeConfig::User(_) => "user",
            ModeConfig::Compute(_) => "compute",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
}
