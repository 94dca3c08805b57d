pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "crypt4gh-recryptor-service")]
#[command(about = "Recrypts Crypt4GH headers for a compute node's rotating keypair")]
pub struct Args {
    /// User node to talk to (defaults to the configured user port on localhost)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the config directory (defaults to ~/.crypt4gh_recryptor)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
