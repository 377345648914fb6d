//! Continuous producer of well-formed payment transactions.
//!
//! Binds the `Transaction` schema to the topic (registering it when
//! `auto_register_schema` is on) and publishes one random transaction every
//! `send_interval_ms`, keyed by account id, until interrupted. Acks are
//! reported as they arrive, without holding up the next send.
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
//! cargo run --bin simple-producer -- producer.toml transactions
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use schemagate_cli::generator::TransactionGenerator;
use schemagate_cli::settings::Settings;
use schemagate_client::{Acknowledgement, Publisher};
use schemagate_schema::Transaction;
use tracing::info;

#[derive(Parser)]
#[command(name = "simple-producer")]
#[command(about = "Publish schema-validated sample transactions", long_about = None)]
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
    println!("  Transaction Producer (Schema Validated)");
    println!("  Topic:    {}", args.topic);
    println!("  Registry: {}", settings.schema_registry.url);
    println!("=============================================");

    let collaborators = settings.connect(&args.topic).await?;
    let publisher = Publisher::builder()
        .registry(collaborators.registry)
        .sink(collaborators.sink)
        .config(settings.publisher_config())
        .build()
        .context("Failed to start publisher")?;

    let bound = publisher
        .bind_schema::<Transaction>(&args.topic)
        .await
        .with_context(|| format!("Failed to bind schema for topic '{}'", args.topic))?;
    info!(
        topic = %args.topic,
        subject = %bound.subject(),
        schema_id = bound.id().0,
        "Schema bound"
    );

    let mut generator = TransactionGenerator::new();
    let mut interval = tokio::time::interval(settings.send_interval());
    let mut acks: FuturesUnordered<BoxFuture<'static, (String, Acknowledgement)>> =
        FuturesUnordered::new();
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            Some((key, ack)) = acks.next(), if !acks.is_empty() => {
                report(&key, ack);
                continue;
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        let txn = generator.next_transaction();
        let key = txn.account_id().to_string();
        let pending = match publisher
            .publish_record(&args.topic, Some(&key), &txn, &bound)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                eprintln!("FAIL: {}", e);
                break;
            }
        };

        sent += 1;
        if sent % 10 == 0 {
            println!("-- Total sent: {} --", sent);
        }
        acks.push(async move { (key, pending.await) }.boxed());
    }

    println!("Shutting down after {} sent", sent);
    publisher.close().await.context("Failed to close publisher")?;
    while let Some((key, ack)) = acks.next().await {
        report(&key, ack);
    }
    Ok(())
}

fn report(key: &str, ack: Acknowledgement) {
    match ack {
        Acknowledgement::Accepted {
            partition, offset, ..
        } => println!(
            ">> Sent  partition={}  offset={}  key={}",
            partition, offset, key
        ),
        Acknowledgement::Rejected { reason, .. } => println!("FAIL: {}", reason),
    }
}
