use std::net::{IpAddr, Ipv4Addr};
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use common::engine::DEFAULT_ENGINE_PROGRAM;

pub const APP_NAME: &str = "crypt4gh_recryptor";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const HEADERS_DIR_NAME: &str = "headers";
pub const KEYS_DIR_NAME: &str = "keys";
pub const USER_PRIVATE_KEY_FILE_NAME: &str = "user.sec";
pub const USER_PUBLIC_KEY_FILE_NAME: &str = "user.pub";
pub const COMPUTE_PRIVATE_KEY_FILE_NAME: &str = "compute.sec";
pub const COMPUTE_PUBLIC_KEY_FILE_NAME: &str = "compute.pub";
pub const COMPUTE_KEYPAIR_METADATA_FILE_NAME: &str = "compute.keypair.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub user: UserSection,
    #[serde(default)]
    pub compute: ComputeSection,
}

/// How the external recryption engine is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Engine binary, looked up on `PATH` when not absolute
    #[serde(default = "default_engine_program")]
    pub program: PathBuf,
    /// Upper bound on a single engine invocation
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
    /// Log engine output at debug level
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_engine_program() -> PathBuf {
    PathBuf::from(DEFAULT_ENGINE_PROGRAM)
}

fn default_engine_timeout_secs() -> u64 {
    60
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            timeout_secs: default_engine_timeout_secs(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSection {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_user_port")]
    pub port: u16,
    /// Base URL of the compute node's key-info endpoint
    #[serde(default = "default_compute_url")]
    pub compute_url: Url,
    /// Extra root certificate (PEM) trusted for the compute node
    #[serde(default)]
    pub root_ca: Option<PathBuf>,
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_user_port() -> u16 {
    8042
}

fn default_compute_port() -> u16 {
    8043
}

fn default_compute_url() -> Url {
    Url::parse(&format!("https://localhost:{}", default_compute_port()))
        .expect("hardcoded URL must parse")
}

fn default_network_timeout_secs() -> u64 {
    30
}

impl Default for UserSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_user_port(),
            compute_url: default_compute_url(),
            root_ca: None,
            network_timeout_secs: default_network_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeSection {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_compute_port")]
    pub port: u16,
    /// Require key-info callers to present the current compute public key
    #[serde(default = "default_verify_public_key")]
    pub verify_public_key: bool,
    /// Lifetime given to freshly generated compute keypairs
    #[serde(default = "default_keypair_lifetime_hours")]
    pub keypair_lifetime_hours: u32,
}

fn default_verify_public_key() -> bool {
    true
}

fn default_keypair_lifetime_hours() -> u32 {
    24
}

impl Default for ComputeSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_compute_port(),
            verify_public_key: default_verify_public_key(),
            keypair_lifetime_hours: default_keypair_lifetime_hours(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the service directory (~/.crypt4gh_recryptor)
    pub app_dir: PathBuf,
    /// Path to the header store directory
    pub headers_path: PathBuf,
    /// Path to the key directory
    pub keys_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the service directory path (custom or default ~/.crypt4gh_recryptor)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new service directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if app_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&app_dir)?;

        let headers_path = app_dir.join(HEADERS_DIR_NAME);
        fs::create_dir_all(&headers_path)?;
        let keys_path = app_dir.join(KEYS_DIR_NAME);
        fs::create_dir_all(&keys_path)?;

        let config = config.unwrap_or_default();
        let config_path = app_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            app_dir,
            headers_path,
            keys_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the service directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let headers_path = app_dir.join(HEADERS_DIR_NAME);
        let keys_path = app_dir.join(KEYS_DIR_NAME);
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !keys_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", KEYS_DIR_NAME)));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            app_dir,
            headers_path,
            keys_path,
            config_path,
            config,
        })
    }

    pub fn user_private_key_path(&self) -> PathBuf {
        self.keys_path.join(USER_PRIVATE_KEY_FILE_NAME)
    }

    pub fn user_public_key_path(&self) -> PathBuf {
        self.keys_path.join(USER_PUBLIC_KEY_FILE_NAME)
    }

    pub fn compute_private_key_path(&self) -> PathBuf {
        self.keys_path.join(COMPUTE_PRIVATE_KEY_FILE_NAME)
    }

    /// On a user node this holds a copy of the compute node's public key
    pub fn compute_public_key_path(&self) -> PathBuf {
        self.keys_path.join(COMPUTE_PUBLIC_KEY_FILE_NAME)
    }

    pub fn compute_keypair_metadata_path(&self) -> PathBuf {
        self.keys_path.join(COMPUTE_KEYPAIR_METADATA_FILE_NAME)
    }

    /// Read the extra root certificate configured for the compute node, if any
    pub fn load_root_ca(&self) -> Result<Option<Vec<u8>>, StateError> {
        match &self.config.user.root_ca {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    self.app_dir.join(path)
                };
                Ok(Some(fs::read(&path).map_err(|e| {
                    StateError::InvalidRootCa(format!("{}: {}", path.display(), e))
                })?))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("service directory not initialized. Run 'crypt4gh-recryptor-service init' first")]
    NotInitialized,

    #[error("service directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid root certificate: {0}")]
    InvalidRootCa(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
