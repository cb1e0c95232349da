//! Turnstile CLI
//!
//! Interactive agent REPL with tool authorization and approval gates.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use turnstile::{
    ArcadeAuth, Config, GraphHarness, LineConsole, Resolver, Result, Session, TurnController,
};

/// Settings come from the environment and `.turnstile/config.toml`
#[derive(Parser)]
#[command(name = "turnstile")]
#[command(author, version, about = "Interactive agent REPL with tool authorization gates")]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    let _cli = Cli::parse();

    // Logs go to stderr so they never interleave with the conversation
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    let harness = GraphHarness::new(&config)?;
    let auth = ArcadeAuth::new(&config.auth)?;
    info!(agent = %config.agent.url, auth = %config.auth.base_url, "Starting turnstile");

    let controller = TurnController::new(Arc::new(harness), Resolver::new(Arc::new(auth)));
    let mut session = Session::new(&config, controller, LineConsole::stdio());
    session.run().await
}
