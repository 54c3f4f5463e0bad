//! Reaction archiver bot core.
//!
//! A chat-platform moderation/archival library: messages that accumulate
//! community reactions above a threshold are persisted to a local SQLite
//! store, with resumable full-history scans, anonymized "guess the author"
//! polls and leaderboard scoring on top.
//!
//! The platform wire protocol is the embedder's concern: implement
//! [`gateway::ChatGateway`] over your platform SDK, build a [`bot::Bot`]
//! from it, and bind gateway events and commands to the bot's entry
//! points.

pub mod archive;
pub mod bot;
pub mod config;
pub mod db;
pub mod events;
pub mod gateway;
pub mod poll;
pub mod scan;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for an embedding process.
///
/// Respects `RUST_LOG`; set `LOG_FORMAT=json` for structured output.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reaction_archiver=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
