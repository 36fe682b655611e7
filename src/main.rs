//! Ceph Reconciler
//!
//! Applies a YAML manifest of Ceph cluster objects through the Ceph Manager
//! REST API and keeps the authoritative state in a JSON file.
//!
//! ```text
//! ceph-reconciler apply                    converge the cluster on the manifest
//! ceph-reconciler refresh                  re-read every managed object
//! ceph-reconciler import <address> <id>    adopt an existing object
//! ceph-reconciler destroy                  delete every managed object
//! ceph-reconciler show                     print state with secrets masked
//! ceph-reconciler schema                   print the manifest JSON Schema
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ceph_reconciler::runtime::manifest;
use ceph_reconciler::{
    Address, Engine, Manifest, OpContext, Provider, ProviderConfig, Report, StateStore,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Ceph Reconciler - desired-state management over the Ceph Manager REST API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Manifest describing the provider and the desired resources
    #[arg(long, short, env = "CEPH_MANIFEST", default_value = "ceph.yaml", global = true)]
    manifest: PathBuf,

    /// State file
    #[arg(long, short, env = "CEPH_STATE", default_value = "ceph.state.json", global = true)]
    state: PathBuf,

    /// Bearer token; overrides the manifest
    #[arg(long, env = "CEPH_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Dashboard user; overrides the manifest
    #[arg(long, env = "CEPH_USERNAME", global = true)]
    username: Option<String>,

    /// Dashboard password; overrides the manifest
    #[arg(long, env = "CEPH_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update or replace declared resources and delete undeclared ones
    Apply,
    /// Re-read every resource in state and record drift
    Refresh,
    /// Adopt an existing object, e.g. `import ceph_pool.rbd rbd`
    Import {
        /// `<kind>.<name>` the object is managed under
        address: Address,
        /// Kind-specific import id
        id: String,
    },
    /// Delete every resource in state
    Destroy,
    /// Print the state file with sensitive attributes masked
    Show,
    /// Print the JSON Schema of the manifest and resource models
    Schema,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    match &args.command {
        Command::Schema => {
            let schema = manifest::schema()?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        Command::Show => {
            let store = StateStore::open(&args.state)?;
            println!("{}", serde_json::to_string_pretty(&store.state().rendered()?)?);
            return Ok(());
        }
        _ => {}
    }

    info!("Starting Ceph Reconciler");
    info!("  Version: {}", ceph_reconciler::VERSION);
    info!("  Manifest: {}", args.manifest.display());
    info!("  State: {}", args.state.display());

    let manifest = Manifest::load(&args.manifest)
        .with_context(|| format!("loading manifest {}", args.manifest.display()))?;
    let provider_config = override_credentials(manifest.provider.clone(), &args);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the in-flight operation");
            interrupt.cancel();
        }
    });

    let provider = Provider::configure(&provider_config, &cancel)
        .await
        .context("configuring provider")?;
    let mut store = StateStore::open(&args.state)?;
    let mut engine = Engine::new(&provider, &mut store, OpContext::new(cancel));

    let report = match &args.command {
        Command::Apply => engine.apply(&manifest).await?,
        Command::Refresh => engine.refresh().await?,
        Command::Import { address, id } => engine.import(address, id).await?,
        Command::Destroy => engine.destroy().await?,
        Command::Show | Command::Schema => return Ok(()),
    };

    summarize(&report);
    if !report.is_success() {
        bail!("{} resource(s) failed", report.failures.len());
    }
    Ok(())
}

/// Credentials from flags or environment replace those in the manifest
fn override_credentials(mut config: ProviderConfig, args: &Args) -> ProviderConfig {
    if let Some(token) = &args.token {
        config.token = Some(token.clone());
        config.username = None;
        config.password = None;
    }
    if args.username.is_some() || args.password.is_some() {
        config.token = None;
        if let Some(username) = &args.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &args.password {
            config.password = Some(password.clone());
        }
    }
    config
}

fn summarize(report: &Report) {
    for (address, action) in &report.actions {
        println!("{}: {}", address, action);
    }
    for (address, diagnostic) in &report.diagnostics {
        println!("{}: {}", address, diagnostic);
    }
    for (address, error) in &report.failures {
        eprintln!("{}: error: {}", address, error);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
