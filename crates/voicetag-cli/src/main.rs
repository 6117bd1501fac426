//! CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use voicetag_cli::{Cli, Commands, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Key { speaker, text } => {
            let key = handlers::key::execute(&speaker, &text)?;
            println!("{key}");
        }
        Commands::Render(args) => {
            let outcome = handlers::render::execute(&args).await?;
            println!("{}", outcome.markup);
            if outcome.failed > 0 {
                eprintln!("{} bubble(s) failed to generate", outcome.failed);
            }
        }
    }
    Ok(())
}
