//! Turnstile CLI binary entry point.

use tracing_subscriber::EnvFilter;
use turnstile::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("turnstile=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    let result = match cli.command {
        Commands::Exec(args) => turnstile::cli::commands::handle_exec(args).await,
        Commands::Chat(args) => turnstile::cli::commands::handle_chat(args).await.map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Hint: {}", e.recovery_suggestion().hint());
            std::process::exit(1);
        }
    }
}
