use clap::Args;

use recryptor_service::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// User node port written to config.toml
    #[arg(long)]
    pub user_port: Option<u16>,

    /// Compute node port written to config.toml
    #[arg(long)]
    pub compute_port: Option<u16>,

    /// Base URL of the compute node, as seen from the user node
    #[arg(long)]
    pub compute_url: Option<url::Url>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(port) = self.user_port {
            config.user.port = port;
        }
        if let Some(port) = self.compute_port {
            config.compute.port = port;
        }
        if let Some(url) = &self.compute_url {
            config.user.compute_url = url.clone();
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(format!(
            "Initialized {}\n  config:  {}\n  headers: {}\n  keys:    {}\n\nNext: run `generate-keypair --user` on the user node and `generate-keypair` on the compute node",
            state.app_dir.display(),
            state.config_path.display(),
            state.headers_path.display(),
            state.keys_path.display(),
        ))
    }
}
