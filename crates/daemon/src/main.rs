// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{
    args::Args, op::Op, Compute, GenerateKeypair, Health, Info, Init, Recrypt, User, Version,
};

command_enum! {
    (Init, Init),
    (User, User),
    (Compute, Compute),
    (GenerateKeypair, GenerateKeypair),
    (Recrypt, Recrypt),
    (Info, Info),
    (Health, Health),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Resolve remote URL: explicit flag > config user port > 8042
    let remote = cli::op::resolve_remote(args.remote, args.config_path.clone());

    let ctx = match cli::op::OpContext::new(remote, args.config_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to create API client: {}", e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
