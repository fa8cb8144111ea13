//! authsync-sim - scripted walkthrough of the authorization engine
//!
//! Wires in-memory sources for all three external tiers, lets the primary
//! list arrive late and drift later, and prints every engine event as a
//! JSON line. Gate decisions for the `--check` identities are printed at the
//! end together with the final resolved set.

use anyhow::{Context, Result};
use authsync_common::config::load_config;
use authsync_common::events::AuthEvent;
use authsync_engine::{AuthorizationEngine, InMemorySource, RichFlags, SessionContext};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for authsync-sim
#[derive(Parser, Debug)]
#[command(name = "authsync-sim")]
#[command(about = "Simulate authority-list resolution for one participant")]
#[command(version)]
struct Args {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, env = "AUTHSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds before the primary list becomes available
    #[arg(long, default_value = "4")]
    primary_delay_secs: u64,

    /// Seconds before the primary list changes
    #[arg(long, default_value = "15")]
    drift_after_secs: u64,

    /// Total simulated run time in seconds
    #[arg(long, default_value = "30")]
    duration_secs: u64,

    /// Never deliver the primary list, exercising exhaustion fallthrough
    #[arg(long)]
    primary_never_arrives: bool,

    /// Identity of the local participant
    #[arg(long, default_value = "Dave")]
    local_identity: String,

    /// Identities to run through the gate at the end
    #[arg(long = "check", value_name = "IDENTITY")]
    checks: Vec<String>,
}

/// Session stand-in that only logs what a real host would do
struct SimSession {
    identity: String,
}

impl SessionContext for SimSession {
    fn local_identity(&self) -> String {
        self.identity.clone()
    }

    fn is_local_owner(&self) -> bool {
        false
    }

    fn take_ownership(&self) {
        info!(identity = %self.identity, "Took ownership of session state");
    }

    fn request_display_refresh(&self) {
        info!("Display refresh requested");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("authsync_engine={0},authsync_sim={0}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    info!(
        "Starting authsync-sim v{} ({} manual entries)",
        env!("CARGO_PKG_VERSION"),
        config.manual_list.len()
    );

    let primary = Arc::new(InMemorySource::new());
    let secondary = Arc::new(InMemorySource::new().with_rich(RichFlags {
        session_unrestricted: Some(false),
        secondary_controller_override: Some(true),
        first_controller: Some("Frank".to_string()),
        ..RichFlags::default()
    }));
    let tertiary = Arc::new(InMemorySource::with_list(["Tess"]));
    let session = Arc::new(SimSession {
        identity: args.local_identity.clone(),
    });

    let engine = AuthorizationEngine::builder(config)
        .primary(primary.clone())
        .secondary(secondary.clone())
        .tertiary(tertiary.clone())
        .session(session)
        .build()
        .context("Failed to build authorization engine")?;

    let mut rx = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    engine.start();
    info!(local_allowed = engine.can_interact_local(), "Initial gate decision");

    if !args.primary_never_arrives {
        let source = primary.clone();
        let delay = Duration::from_secs(args.primary_delay_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("Primary list arrived");
            source.set_list(["Dave", "Erin"]);
        });

        let source = primary.clone();
        let delay = Duration::from_secs(args.drift_after_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("Primary list edited");
            source.set_list(["Dave", "Erin", "Gus"]);
        });
    }

    tokio::time::sleep(Duration::from_secs(args.duration_secs)).await;

    let mutated = engine.authorize_mutation();
    info!(local_identity = %args.local_identity, mutated, "Mutation attempt");

    for identity in &args.checks {
        println!("{:>16}  {}", identity, verdict(engine.can_interact(identity, false)));
    }

    let snapshot = engine.snapshot();
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    println!(
        "secondary={:?} tertiary={:?}",
        secondary.current_list(),
        tertiary.current_list()
    );

    printer.abort();
    Ok(())
}

fn print_event(event: &AuthEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
    }
}

fn verdict(allowed: bool) -> &'static str {
    if allowed {
        "allowed"
    } else {
        "denied"
    }
}
