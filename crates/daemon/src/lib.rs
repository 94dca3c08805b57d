// Service modules
pub mod http_server;
pub mod process;
pub mod recrypt;
pub mod service_config;
pub mod service_state;

// App state (configuration, paths)
pub mod state;

pub use process::{spawn_service, start_service, ShutdownHandle};
pub use recrypt::{RecryptError, Recryptor};
pub use service_config::Config as ServiceConfig;
pub use service_state::{ComputeState, UserState};
pub use state::{AppConfig, AppState, StateError};
