//! # schwab-streamer
//!
//! Streams account activity and prints each item as a JSON line on stdout.
//! Logs go to stderr.

#![deny(unsafe_code)]

mod wiring;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schwab_core::logging::init_subscriber;
use schwab_settings::{SchwabSettings, load_settings, load_settings_from_path};
use schwab_stream::{AccountContent, SessionHandlers, StreamError, StreamingSession};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Account activity streamer.
#[derive(Parser, Debug)]
#[command(name = "schwab-streamer", about = "Stream Schwab account activity")]
struct Cli {
    /// Settings file (default: `~/.schwab/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the URL to open in a browser to obtain an authorization code.
    AuthorizeUrl,
    /// Log in, subscribe to account activity and print updates until Ctrl-C.
    Stream,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    match cli.command {
        Commands::AuthorizeUrl => {
            println!("{}", wiring::oauth_config(&settings).authorization_url());
            Ok(())
        }
        Commands::Stream => run_stream(&settings).await,
    }
}

async fn run_stream(settings: &SchwabSettings) -> Result<()> {
    settings.validate().context("invalid settings")?;
    let wiring = wiring::build(settings)?;
    let preferences = wiring.preferences(settings);
    let cancel = CancellationToken::new();

    let handlers = SessionHandlers::new(print_update).with_error_handler(|err: &StreamError| {
        warn!(error = %err, category = err.category(), "dropped stream frame");
    });
    let session = StreamingSession::connect(&preferences, wiring.provider, handlers, &cancel)
        .await
        .context("failed to start streaming session")?;
    info!("streaming account activity, press Ctrl-C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("shutting down");
        }
        () = session.closed() => warn!("stream ended"),
    }

    session.shutdown().await;
    Ok(())
}

fn print_update(content: AccountContent) {
    match serde_json::to_string(&content) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(error = %err, "failed to encode account update"),
    }
}
