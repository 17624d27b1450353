#![forbid(unsafe_code)]
//! Line-delimited JSON bridge to the message interface
//!
//! Reads one command per line from stdin and writes one response envelope
//! per line to stdout. Commands run concurrently, so replies come back in
//! completion order; a request's `"id"` member is echoed in its reply.
//! Logs go to stderr, filtered by `RUST_LOG`.

use clap::Parser;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trinity_client::config::load_config;
use trinity_client::message_interface::MessageHandler;
use trinity_client::ClientBuilder;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML client configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Never contact a node
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut builder = match &cli.config {
        Some(path) => ClientBuilder::from_config(load_config(path)?),
        None => ClientBuilder::new(),
    };
    if cli.offline {
        builder = builder.with_offline_mode();
    }
    let handler = MessageHandler::with_client(builder.finish().await?);
    info!(offline = handler.client().is_offline(), "message bridge ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut in_flight = FuturesUnordered::new();
    let mut input_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    let handler = &handler;
                    in_flight.push(async move { handler.handle_tagged_json(&line).await });
                }
                None => input_open = false,
            },
            Some(mut reply) = in_flight.next(), if !in_flight.is_empty() => {
                reply.push('\n');
                stdout.write_all(reply.as_bytes()).await?;
                stdout.flush().await?;
            }
            else => break,
        }
    }
    Ok(())
}
