//! ADJUD - Adjudication Core CLI
//!
//! Permission checks against a YAML role file, and a local run of the policy
//! ingestion pipeline.

use adjudication_core::{
    ingest_queue_with_warning, shutdown_channel, CoreConfig, DocumentProcessor, InMemoryPolicyStore, IngestWorker,
    PermissionCache, PermissionLevel, PolicyIngestEvent, PolicyStatus, PolicyStore, RoleId, StatusTrackingHandler,
    SystemClock, UploadService, YamlRoleStore,
};
use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adjud")]
#[command(version = "0.4.2")]
#[command(about = "Adjudication Core - permissions and policy ingestion", long_about = None)]
struct Cli {
    /// Core configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a role may act on a feature
    Check {
        /// Role file (YAML)
        #[arg(long, default_value = "roles.yaml")]
        roles: PathBuf,
        /// Role id (UUID)
        #[arg(long)]
        role: RoleId,
        /// Feature name (e.g., Claims)
        #[arg(long)]
        feature: String,
        /// Required level (read, write)
        #[arg(long, default_value = "read")]
        level: PermissionLevel,
    },
    /// List roles and their feature grants
    Roles {
        /// Role file (YAML)
        #[arg(long, default_value = "roles.yaml")]
        roles: PathBuf,
    },
    /// Upload policy documents and run them through the ingestion pipeline
    Ingest {
        /// Policy documents to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}

/// Local stand-in for document understanding: rejects empty files and PDFs
/// without a PDF header.
struct LocalFileProcessor;

#[async_trait]
impl DocumentProcessor for LocalFileProcessor {
    async fn process(&self, event: &PolicyIngestEvent) -> anyhow::Result<()> {
        anyhow::ensure!(event.size() > 0, "{} is empty", event.file_name());

        let is_pdf = Path::new(event.file_name())
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            anyhow::ensure!(
                event.content().starts_with(b"%PDF"),
                "{} does not look like a PDF",
                event.file_name()
            );
        }

        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CoreConfig> {
    match path {
        Some(path) => CoreConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(CoreConfig::default()),
    }
}

async fn handle_check(
    config: &CoreConfig,
    roles: PathBuf,
    role: RoleId,
    feature: &str,
    level: PermissionLevel,
) -> anyhow::Result<ExitCode> {
    let store = Arc::new(YamlRoleStore::new(roles));
    let cache = PermissionCache::from_config(store, Arc::new(SystemClock), &config.spec.permission_cache);

    match cache.has_permission(&role, feature, level).await {
        Ok(true) => {
            println!("ALLOWED  role={} feature={} level={}", role, feature, level);
            Ok(ExitCode::SUCCESS)
        }
        Ok(false) => {
            println!("DENIED   role={} feature={} level={}", role, feature, level);
            Ok(ExitCode::from(1))
        }
        Err(e) => {
            println!("DENIED   role={} feature={} level={} ({})", role, feature, level, e);
            Ok(ExitCode::from(2))
        }
    }
}

async fn handle_roles(roles: PathBuf) -> anyhow::Result<ExitCode> {
    let store = YamlRoleStore::new(roles);
    let file = store.load_file().await?;

    if file.roles.is_empty() {
        println!("No roles defined in {}", store.path().display());
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<38} {:<24} PERMISSIONS", "ID", "NAME");
    for role in &file.roles {
        let mut grants: Vec<String> = role
            .permissions
            .iter()
            .map(|(feature, level)| format!("{}:{}", feature, level))
            .collect();
        grants.sort();
        println!("{:<38} {:<24} {}", role.id.to_string(), role.name, grants.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

async fn handle_ingest(config: &CoreConfig, files: Vec<PathBuf>, format: &str) -> anyhow::Result<ExitCode> {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryPolicyStore::new());
    let (queue, consumer) = ingest_queue_with_warning(config.spec.ingest.depth_warning);

    let handler = StatusTrackingHandler::new(store.clone(), Arc::new(LocalFileProcessor), clock.clone());
    let mut worker = IngestWorker::new(Arc::new(move || handler.clone()));

    let (shutdown, signal) = shutdown_channel();
    let trigger = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("[Ingest] Received SIGTERM/SIGINT, shutting down...");
        trigger.fire();
    })?;

    worker.start(consumer, signal)?;

    {
        let upload = UploadService::new(store.clone(), queue, clock.clone());
        for path in &files {
            let content = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let name = Path::new(&file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| file_name.clone());

            upload.upload(name, file_name, content).await?;
        }
        // Dropping the last producer lets the worker finish once the queue is drained.
    }

    let mut interrupted = shutdown.signal();
    tokio::select! {
        _ = finished(&worker) => {}
        _ = interrupted.cancelled() => {}
    }

    let consumer = if worker.is_finished() {
        Some(worker.join().await?)
    } else {
        // Interrupted with a handler still running: give it the configured grace.
        worker.stop_with_grace(config.spec.ingest.stop_grace()).await?
    };

    let records = store.list().await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => {
            println!("{:<38} {:<12} {:<28} REASON", "POLICY", "STATUS", "FILE");
            for record in &records {
                println!(
                    "{:<38} {:<12} {:<28} {}",
                    record.id.to_string(),
                    record.status.to_string(),
                    record.file_name,
                    record.failure_reason.as_deref().unwrap_or("-")
                );
            }
        }
    }

    match consumer {
        Some(consumer) if consumer.pending() > 0 => {
            eprintln!("[Ingest] {} event(s) not processed before shutdown", consumer.pending());
        }
        Some(_) => {}
        None => eprintln!("[Ingest] Grace period elapsed, in-flight document abandoned"),
    }

    let stats = worker.stats();
    eprintln!(
        "[Ingest] delivered={} succeeded={} failed={}",
        stats.delivered, stats.succeeded, stats.failed
    );

    let all_active = records.iter().all(|r| r.status == PolicyStatus::Active);
    Ok(if all_active { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

/// Resolves once the worker loop has exited on its own
async fn finished(worker: &IngestWorker) {
    let mut tick = tokio::time::interval(std::time::Duration::from_millis(50));
    while !worker.is_finished() {
        tick.tick().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { roles, role, feature, level } => handle_check(&config, roles, role, &feature, level).await,
        Commands::Roles { roles } => handle_roles(roles).await,
        Commands::Ingest { files, format } => handle_ingest(&config, files, &format).await,
    }
}
