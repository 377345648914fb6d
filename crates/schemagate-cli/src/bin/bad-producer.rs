//! Rogue producer that skips schema validation.
//!
//! Sends three malformed payloads straight to the broker, without a schema
//! frame, to show what happens when only the broker can stop them. With
//! schema enforcement on the broker every test prints `BLOCKED`.
//!
//! # Environment Variables
//!
//! - `SCHEMAGATE_REGISTRY_URL`: overrides `[schema_registry] url`
//! - `SCHEMAGATE_BROKER_URL`: overrides `[broker] url`
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Example
//!
//! ```bash
//! cargo run --bin bad-producer -- producer.toml transactions
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use schemagate_cli::settings::Settings;
use schemagate_client::{Acknowledgement, Publisher};

const KEY: &str = "ACC-TEST";

const BAD_PAYLOADS: [(&str, &str); 3] = [
    (
        "missing required fields",
        r#"{"transactionId":"TXN-BAD-001","accountId":"ACC-TEST"}"#,
    ),
    ("not JSON at all", "this is not even JSON"),
    (
        "wrong type for amount",
        r#"{"transactionId":"TXN-BAD-003","accountId":"ACC-TEST","amount":"not-a-number","currency":"SAR","merchant":"Test","country":"SA","timestamp":123}"#,
    ),
];

#[derive(Parser)]
#[command(name = "bad-producer")]
#[command(about = "Send malformed records without schema validation", long_about = None)]
struct Args {
    /// Path to the TOML settings file
    config: String,

    /// Topic to publish to
    topic: String,

    /// Schema registry URL
    #[arg(long, env = "SCHEMAGATE_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Broker URL
    #[arg(long, env = "SCHEMAGATE_BROKER_URL")]
    broker_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    schemagate_cli::init_tracing();
    let args = Args::parse();

    let mut settings = Settings::load(&args.config)?;
    settings.override_urls(args.registry_url, args.broker_url);
    settings.validate().context("Invalid URL override")?;

    println!("=============================================");
    println!("  BAD Producer - No Schema Validation");
    println!("  Topic: {}", args.topic);
    println!("=============================================");

    let collaborators = settings.connect(&args.topic).await?;
    let publisher = Publisher::builder()
        .registry(collaborators.registry)
        .sink(collaborators.sink)
        .config(settings.publisher_config())
        .validate_on_send(false)
        .build()
        .context("Failed to start publisher")?;

    for (index, (label, payload)) in BAD_PAYLOADS.iter().enumerate() {
        println!();
        println!("TEST {}: {}", index + 1, label);
        println!("  payload: {}", payload);

        let pending = publisher
            .publish_unvalidated(&args.topic, Some(KEY), payload.as_bytes())
            .await;
        publisher.flush().await.context("Failed to flush")?;

        match pending.await {
            Acknowledgement::Accepted {
                partition, offset, ..
            } => println!(
                "  ACCEPTED (partition={}, offset={}) <-- should NOT happen with broker-side validation",
                partition, offset
            ),
            Acknowledgement::Rejected { reason, .. } => println!("  BLOCKED: {}", reason),
        }
    }

    println!();
    println!("=============================================");
    println!("  If any test was ACCEPTED, the broker is not enforcing schemas.");
    println!("  Enable schema validation on the broker for this topic");
    println!("  (in-process broker: [broker] enforce_schemas = true).");
    println!("=============================================");

    publisher.close().await.context("Failed to close publisher")?;
    Ok(())
}
