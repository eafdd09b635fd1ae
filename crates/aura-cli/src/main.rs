use std::path::Path;

use anyhow::{Context, Result};
use aura_cli::handlers;
use aura_cli::{Cli, Commands};
use aura_core::PresenceSettings;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Devices { json } => handlers::devices::execute(json),
        Commands::Classify { text, json } => handlers::classify::execute(&text.join(" "), json),
        Commands::Agents {
            prompt,
            user_name,
            user_info,
        } => handlers::agents::execute(prompt.as_deref(), user_name, user_info),
        Commands::Monitor(args) => {
            let settings = load_settings(cli.config.as_deref())?;
            handlers::monitor::execute(args, settings).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "aura=debug" } else { "aura=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<PresenceSettings> {
    let Some(path) = path else {
        return Ok(PresenceSettings::with_defaults());
    };
    let settings = PresenceSettings::load(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?settings, "Loaded presence settings");
    Ok(settings)
}
