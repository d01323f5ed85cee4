//! stratus - provision and delete compute instances for capacity claims.
//!
//! Reads claims, node classes and flavor records as JSON files and drives the
//! claim reconciler once. Ctrl-C cancels an in-flight provisioning wait; the
//! instance created so far is reported so it can be cleaned up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use stratus_events::TracingSink;
use stratus_provisioner::config::Config;
use stratus_provisioner::{
    Claim, CloudProvider, ComputeBackend, Flavor, FlavorCatalog, InMemoryNodeClassStore,
    InstanceProvider, MockBackend, NodeClass, NovaClient, ProvisionError,
};
use stratus_reconcile::cancellation;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Provision OpenStack instances for capacity claims.
#[derive(Debug, Parser)]
#[command(name = "stratus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use the in-memory backend instead of the compute API.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch an instance for a claim and print the provisioned claim.
    Create {
        /// Claim JSON file.
        #[arg(long)]
        claim: PathBuf,

        /// Node class JSON file.
        #[arg(long)]
        node_class: PathBuf,

        /// JSON file with a list of flavor records.
        #[arg(long)]
        flavors: PathBuf,

        /// Give up after this many seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Delete the instance behind a provisioned claim.
    Delete {
        /// Claim JSON file.
        #[arg(long)]
        claim: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(
        compute_url = %config.compute_url,
        cluster_name = %config.cluster_name,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    if let Err(e) = run(cli, config).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let backend: Arc<dyn ComputeBackend> = if cli.dry_run {
        Arc::new(MockBackend::new())
    } else {
        Arc::new(NovaClient::new(&config.nova()).context("failed to build compute client")?)
    };

    match cli.command {
        Command::Create {
            claim,
            node_class,
            flavors,
            deadline_secs,
        } => {
            let claim: Claim = read_json(&claim)?;
            let node_class: NodeClass = read_json(&node_class)?;
            let flavors: Vec<Flavor> = read_json(&flavors)?;

            let provider = build_provider(&config, backend, [node_class], flavors);

            let (handle, mut cancel) = cancellation();
            if let Some(secs) = deadline_secs {
                cancel = cancel.with_timeout(std::time::Duration::from_secs(secs));
            }
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received interrupt, cancelling");
                    handle.cancel();
                }
            });

            match provider.create(&claim, &cancel).await {
                Ok(provisioned) => {
                    println!("{}", serde_json::to_string_pretty(&provisioned)?);
                    Ok(())
                }
                Err(e) => {
                    let stranded = e.instance_ids();
                    if e.is_cancelled() && !stranded.is_empty() {
                        warn!(instances = ?stranded, "Instances created before cancellation were left in place");
                    }
                    Err(classify(e))
                }
            }
        }
        Command::Delete { claim } => {
            let claim: Claim = read_json(&claim)?;
            let provider = build_provider(&config, backend, Vec::new(), Vec::new());
            provider.delete(&claim).await.map_err(classify)?;
            info!(claim = %claim.name, "Claim deleted");
            Ok(())
        }
    }
}

fn build_provider(
    config: &Config,
    backend: Arc<dyn ComputeBackend>,
    classes: impl IntoIterator<Item = NodeClass>,
    flavors: Vec<Flavor>,
) -> CloudProvider {
    CloudProvider::new(
        Arc::new(classes.into_iter().collect::<InMemoryNodeClassStore>()),
        Arc::new(FlavorCatalog::new(flavors)),
        InstanceProvider::new(backend, config.instance_settings()),
        config.matcher(),
        Arc::new(TracingSink),
    )
}

fn classify(e: ProvisionError) -> anyhow::Error {
    let kind = if e.is_fatal() {
        "fatal"
    } else if e.is_not_found() {
        "not found"
    } else if e.is_retryable() {
        "retryable"
    } else if e.is_cancelled() {
        "cancelled"
    } else {
        "error"
    };
    anyhow::Error::new(e).context(format!("provisioning failed ({kind})"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
