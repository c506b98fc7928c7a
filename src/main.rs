//! nostr-bridge CLI
//!
//! Generate and inspect keys, build and verify signed notes, and publish them
//! to relays using the same core as the C ABI.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use nostr_bridge::crypto::SchnorrSigner;
use nostr_bridge::event::EventBuilder;
use nostr_bridge::keys::{public_key_from_secret, KeyIdentity};
use nostr_bridge::relay::{PublishOutcome, RelaySession, WebSocketTransport};
use nostr_bridge::{logging, BridgeConfig, SignedEvent};

#[derive(Parser)]
#[command(name = "nostr-bridge")]
#[command(about = "Nostr key, event and relay publishing tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Keygen,

    /// Print the public key for a secret key (nsec or hex)
    Pubkey {
        secret: String,
    },

    /// Build and sign a text note, printing its JSON
    Note {
        /// Secret key (nsec or hex)
        secret: String,

        content: String,

        /// Tags as name=value (t, e or p)
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Verify a serialized event
    Verify {
        json: String,
    },

    /// Sign a text note and publish it to relays
    Publish {
        /// Secret key (nsec or hex)
        secret: String,

        content: String,

        /// Relay URL (repeatable)
        #[arg(short, long, required = true)]
        relay: Vec<String>,

        /// Tags as name=value (t, e or p)
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BridgeConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging);

    let signer = SchnorrSigner::new();

    match cli.command {
        Commands::Keygen => {
            let identity = KeyIdentity::generate(&signer)?;
            println!("npub: {}", identity.npub()?);
            println!("nsec: {}", identity.nsec()?.as_str());
            println!("public key (hex): {}", identity.public_key_hex());
        }

        Commands::Pubkey { secret } => {
            println!("{}", public_key_from_secret(&signer, &secret)?);
        }

        Commands::Note {
            secret,
            content,
            tag,
        } => {
            let identity = KeyIdentity::import(&signer, &secret)?;
            let event = builder(content, tag)?.sign(&identity, &signer)?;
            println!("{}", event.as_json()?);
        }

        Commands::Verify { json } => {
            let event = SignedEvent::from_json(&json, &signer)?;
            println!("valid: {} (kind {}, by {})", event.id(), event.kind(), event.pubkey());
        }

        Commands::Publish {
            secret,
            content,
            relay,
            tag,
        } => {
            let identity = KeyIdentity::import(&signer, &secret)?;
            let event = builder(content, tag)?.sign(&identity, &signer)?;

            let session = RelaySession::new(config.relay.clone(), Arc::new(WebSocketTransport));
            for url in &relay {
                session.add_relay(url).await?;
            }
            session.connect().await?;

            for status in session.relay_status() {
                match &status.last_error {
                    Some(e) => println!("{} {} ({})", status.url, status.state, e),
                    None => println!("{} {}", status.url, status.state),
                }
            }

            let report = session.send_event(&event).await;
            session.disconnect().await;
            let report = report?;

            info!("Published event {}", report.event_id);
            println!("event id: {}", report.event_id);
            for (url, outcome) in &report.outcomes {
                match outcome {
                    PublishOutcome::Accepted => println!("  {}: accepted", url),
                    PublishOutcome::Rejected(reason) => {
                        println!("  {}: rejected ({})", url, reason)
                    }
                    PublishOutcome::Unacknowledged => {
                        println!("  {}: sent, no acknowledgment", url)
                    }
                    PublishOutcome::Failed(e) => println!("  {}: failed ({})", url, e),
                }
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn builder(content: String, tags: Vec<String>) -> Result<EventBuilder> {
    if tags.is_empty() {
        return Ok(EventBuilder::text_note(content));
    }
    let tags = tags
        .iter()
        .map(|tag| parse_tag(tag))
        .collect::<Result<Vec<_>>>()?;
    EventBuilder::text_note_with_tags(content, tags).context("Invalid tags")
}

fn parse_tag(tag: &str) -> Result<Vec<String>> {
    let (name, value) = tag
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid tag format: {} (expected name=value)", tag))?;
    if name.is_empty() {
        bail!("Tag name cannot be empty: {}", tag);
    }
    Ok(vec![name.to_string(), value.to_string()])
}
