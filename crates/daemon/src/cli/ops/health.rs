use clap::Args;

use recryptor_service::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:    {}", state.app_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                for (label, path) in [
                    ("user.sec", state.user_private_key_path()),
                    ("user.pub", state.user_public_key_path()),
                    ("compute.pub", state.compute_public_key_path()),
                    ("compute.sec", state.compute_private_key_path()),
                ] {
                    let status = if path.exists() { "OK" } else { "missing" };
                    lines.push(format!("  {:<13} {}", format!("{}:", label), status));
                }
                lines.push(format!("  user_port:    {}", state.config.user.port));
                lines.push(format!("  compute_port: {}", state.config.compute.port));
                lines.push(format!("  compute_url:  {}", state.config.user.compute_url));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Node ({}):", base));

        for probe in ["livez", "readyz"] {
            let url = format!("{}/_status/{}", base.as_str().trim_end_matches('/'), probe);
            let status = match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => "OK".to_string(),
                Ok(resp) => format!("UNHEALTHY ({})", resp.status()),
                Err(_) => "NOT REACHABLE".to_string(),
            };
            lines.push(format!("  {:<7} {}", format!("{}:", probe), status));
        }

        Ok(lines.join("\n"))
    }
}
