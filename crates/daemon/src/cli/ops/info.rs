use clap::Args;

use recryptor_service::http_server::api::client::ApiError;
use recryptor_service::http_server::api::info::InfoRequest;

#[derive(Args, Debug, Clone)]
pub struct Info;

#[async_trait::async_trait]
impl crate::cli::op::Op for Info {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let info = ctx.client.call(InfoRequest).await?;
        Ok(format!("{} {} ({})", info.name, info.version, ctx.client.base_url()))
    }
}
