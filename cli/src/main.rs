use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use tagsync_arm_client::ArmClient;
use tagsync_arm_client::token_provider_from_env;
use tagsync_core::AuditCoordinator;
use tagsync_core::RequiredTagConfig;
use tagsync_core::TagSyncErr;
use tagsync_core::TypeRegistry;
use tagsync_core::UpdateWorker;
use tagsync_state::StateDb;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tag governance for cloud subscriptions: propagate required resource-group
/// tags onto every resource they contain.
#[derive(Parser)]
#[command(name = "tagsync", version)]
struct Cli {
    /// Path of the state database.
    #[arg(long, global = true, default_value = "tagsync.sqlite", env = "TAGSYNC_DB")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one audit pass over every configured subscription.
    Audit,
    /// Apply queued tag updates.
    Worker {
        /// Stop after this many tasks (default: drain the queue).
        #[arg(long)]
        max: Option<u64>,
    },
    /// Inspect or lift resource-type quarantines.
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCommand,
    },
    /// Manage audit configuration rows.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum QuarantineCommand {
    /// List quarantined resource types and their last error.
    List,
    /// Clear a type's quarantine so the next audit scans it again.
    Clear { resource_type: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// List configuration rows.
    List,
    /// Set the required tags for a subscription (comma-separated keys).
    Set {
        subscription_id: String,
        required_tags: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let db = StateDb::open(&cli.db)
        .await
        .with_context(|| format!("opening state database at {}", cli.db.display()))?;

    match cli.command {
        Command::Audit => run_audit(db).await,
        Command::Worker { max } => run_worker(db, max).await,
        Command::Quarantine { command } => run_quarantine(db, command).await,
        Command::Config { command } => run_config(db, command).await,
    }
}

async fn run_audit(db: StateDb) -> anyhow::Result<()> {
    let tokens = token_provider_from_env()?;
    let arm = Arc::new(ArmClient::new(tokens.into()));
    let registry = TypeRegistry::load(Arc::new(db.clone())).await?;
    let coordinator = AuditCoordinator::new(
        arm,
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        Arc::new(db),
        registry,
    );

    match coordinator.run().await {
        Ok(runs) => {
            for stats in &runs {
                info!(
                    subscription = %stats.subscription_id,
                    groups = stats.groups_total,
                    groups_skipped = stats.groups_skipped,
                    resources = stats.resources_total,
                    resources_skipped = stats.resources_skipped,
                    resources_updated = stats.resources_updated,
                    "audit complete"
                );
            }
            Ok(())
        }
        Err(TagSyncErr::ConfigMissing) => {
            println!(
                "No audit configuration found; a placeholder row was created. \
                 Populate it with `tagsync config set <subscription> <tags>`."
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_worker(db: StateDb, max: Option<u64>) -> anyhow::Result<()> {
    let tokens = token_provider_from_env()?;
    let arm = Arc::new(ArmClient::new(tokens.into()));
    let registry = TypeRegistry::load(Arc::new(db.clone())).await?;
    let worker = UpdateWorker::new(arm, registry);

    let mut processed = 0u64;
    let mut failed = 0u64;
    while max.is_none_or(|limit| processed + failed < limit) {
        let Some((row_id, task)) = db.claim_next_task().await? else {
            break;
        };
        match worker.process(&task).await {
            Ok(()) => processed += 1,
            // No credentials means no progress on anything; stop the drain
            // and leave the task claimed.
            Err(err @ TagSyncErr::Auth(_)) => return Err(err.into()),
            Err(err) => {
                // The type is quarantined; the task is dropped, not retried.
                error!(resource = %task.id, "update abandoned: {err}");
                failed += 1;
            }
        }
        db.delete_task(row_id).await?;
    }
    info!(processed, failed, "worker drain finished");
    Ok(())
}

async fn run_quarantine(db: StateDb, command: QuarantineCommand) -> anyhow::Result<()> {
    use tagsync_core::TypeRegistryStore;
    match command {
        QuarantineCommand::List => {
            let mut entries = db.load_all().await?;
            entries.retain(tagsync_core::TypeRegistryEntry::is_quarantined);
            if entries.is_empty() {
                println!("No quarantined resource types.");
            }
            for entry in entries {
                println!(
                    "{}\t{}",
                    entry.resource_type,
                    entry.error_message.unwrap_or_default()
                );
            }
        }
        QuarantineCommand::Clear { resource_type } => {
            if db.clear_quarantine(&resource_type).await? {
                println!("Cleared quarantine for {resource_type}.");
            } else {
                println!("No registry entry for {resource_type}.");
            }
        }
    }
    Ok(())
}

async fn run_config(db: StateDb, command: ConfigCommand) -> anyhow::Result<()> {
    use tagsync_core::ConfigStore;
    match command {
        ConfigCommand::List => {
            let configs = db.load_configs().await?;
            if configs.is_empty() {
                println!("No configuration rows.");
            }
            for config in configs {
                println!("{}\t{}", config.subscription_id, config.required_tags);
            }
        }
        ConfigCommand::Set {
            subscription_id,
            required_tags,
        } => {
            db.set_config(&RequiredTagConfig {
                subscription_id,
                required_tags,
            })
            .await?;
            println!("Configuration saved.");
        }
    }
    Ok(())
}
