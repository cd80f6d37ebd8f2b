mod controller;
mod session;
mod source;

use anyhow::Result;
use clap::Parser;
use controller::RefreshController;
use env_logger::{Builder, Env};
use session::DiscordSession;
use source::OpenSeaSource;
use tokio::signal;
use tokio::sync::watch;

/// Bot that displays the floor price of an OpenSea collection in Discord.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Token for this Discord bot
    #[arg(short, long)]
    token: String,

    /// Alias for the collection to display in the Discord activity, e.g. BAYC
    #[arg(short, long)]
    alias: String,

    /// OpenSea API URL of the collection to track
    #[arg(short, long)]
    url: String,
}

fn setup_env() {
    // Logger
    Builder::from_env(Env::default().default_filter_or("info")).init();
    // Environment variables
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_env();
    let args = Args::parse();

    let session = DiscordSession::connect(&args.token).await?;
    let source = OpenSeaSource::new(args.url, args.alias.clone());
    let controller = RefreshController::new(session, source, args.alias);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(controller.run(shutdown_rx));

    signal::ctrl_c().await?;
    log::info!("Shutting down");
    shutdown_tx.send(true).ok();
    handle.await?;

    Ok(())
}
