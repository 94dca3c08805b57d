use clap::Args;

use recryptor_service::service_config::ConfigError;
use recryptor_service::state::{AppState, StateError};
use recryptor_service::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct User {
    /// Override the user node port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for User {
    type Error = UserError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = ServiceConfig::user(&state, self.port, self.log_dir.clone())?;

        spawn_service(&config).await;
        Ok("user node stopped".to_string())
    }
}
