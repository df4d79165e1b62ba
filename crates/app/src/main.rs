//! Chatter - two-peer terminal chat
//!
//! Hosts or joins a single password-gated TCP chat session.

use clap::Parser;
use chatter_net::{ChatService, NetworkSignal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;
mod console;

use cli::Cli;
use config::AppConfig;

fn main() {
    let cli = Cli::parse();

    let loaded = AppConfig::load_or_default(cli.config.as_deref());
    let level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.log.level.clone()))
        .unwrap_or_else(|| "info".to_string());

    // Logs go to stderr so they don't interleave with the chat on stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)))
        .init();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    tracing::info!(mode = ?cli.command, player = %config.player.name, "Starting Chatter");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let service = ChatService::spawn(config.network.clone(), NetworkSignal::new(true));
        console::run(service, cli.command, config.player).await
    });

    if let Err(e) = result {
        tracing::error!("Chat service failed: {}", e);
        std::process::exit(1);
    }
}
