use clap::{Parser, Subcommand};
use hivewire_core::{Config, HivewireError, TenantKeyspace};
use hivewire_gateway::{AppState, GatewayServer};
use hivewire_pipeline::{
    Committer, DecisionLog, HitlGate, Judge, Perception, Planner, Supervisor, Worker,
};
use hivewire_skills::{provider_from_config, SkillRegistry};
use hivewire_store::{BudgetLedger, MemoryStore, Store};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod resource;

/// Process exit codes.
const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_STORE_UNREACHABLE: i32 = 2;
const EXIT_INVARIANT: i32 = 3;

#[derive(Parser)]
#[command(name = "hivewire", about = "Hivewire — multi-tenant agent orchestration fabric")]
struct Cli {
    /// Path to the fleet config file
    #[arg(short, long, default_value = "hivewire.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator and the operator gateway
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Manage skills
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// List the registered skill handlers
    List,
}

#[derive(Deserialize)]
struct FleetConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default = "default_tenants")]
    tenants: Vec<TenantConfig>,
}

#[derive(Deserialize)]
struct TenantConfig {
    tenant_id: String,
    #[serde(default = "default_worker_count")]
    workers: usize,
    #[serde(default = "default_judge_count")]
    judges: usize,
    /// Per-tenant lease overrides; the environment defaults apply otherwise.
    worker_lease_sec: Option<u64>,
    judge_lease_sec: Option<u64>,
    #[serde(default)]
    perception: Vec<PerceptionConfig>,
}

impl TenantConfig {
    fn scoped_config(&self, base: &Config) -> Config {
        let mut config = base.clone();
        if let Some(lease) = self.worker_lease_sec {
            config.worker_lease_sec = lease;
        }
        if let Some(lease) = self.judge_lease_sec {
            config.judge_lease_sec = lease;
        }
        config
    }
}

#[derive(Deserialize)]
struct PerceptionConfig {
    campaign_id: String,
    resource_uris: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_worker_count() -> usize {
    2
}

fn default_judge_count() -> usize {
    1
}

fn default_tenants() -> Vec<TenantConfig> {
    vec![TenantConfig {
        tenant_id: "default".to_string(),
        workers: default_worker_count(),
        judges: default_judge_count(),
        worker_lease_sec: None,
        judge_lease_sec: None,
        perception: vec![],
    }]
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            error!(%err, "exiting");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &HivewireError) -> i32 {
    match err {
        HivewireError::Config(_) => EXIT_CONFIG,
        HivewireError::Store(_) => EXIT_STORE_UNREACHABLE,
        HivewireError::Invariant(_) => EXIT_INVARIANT,
        _ => EXIT_CONFIG,
    }
}

async fn run(cli: Cli) -> Result<(), HivewireError> {
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => serve(cli.config, config, host, port).await,
        Commands::Skill { action } => match action {
            SkillAction::List => {
                for descriptor in SkillRegistry::builtin().descriptors() {
                    println!("  {} — {}", descriptor.name, descriptor.description);
                }
                Ok(())
            }
        },
    }
}

async fn serve(
    config_path: PathBuf,
    config: Config,
    host: String,
    port: u16,
) -> Result<(), HivewireError> {
    let fleet: FleetConfig = match tokio::fs::read_to_string(&config_path).await {
        Ok(raw) => toml::from_str(&raw)
            .map_err(|e| HivewireError::Config(format!("invalid {}: {e}", config_path.display())))?,
        // Absent config file: run the default single-tenant fleet.
        Err(_) => FleetConfig {
            data_dir: default_data_dir(),
            tenants: default_tenants(),
        },
    };

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    // Startup probe: a store that cannot answer here is fatal (exit 2).
    store
        .get("tenant:default:campaign:startup-probe")
        .await
        .map_err(|e| HivewireError::Store(format!("store unreachable at startup: {e}")))?;

    let ledger = Arc::new(BudgetLedger::new(
        store.clone(),
        config.max_daily_spend_usdc,
        config.max_per_tx_usdc,
    ));
    let secrets = provider_from_config(&config.secrets_provider, store.clone());
    let registry = Arc::new(SkillRegistry::builtin());
    let decision_log = Arc::new(DecisionLog::new(fleet.data_dir.join("decisions")));

    let mut supervisor = Supervisor::new();

    for tenant in &fleet.tenants {
        let ks = TenantKeyspace::new(&tenant.tenant_id);
        let tenant_config = tenant.scoped_config(&config);

        for i in 0..tenant.workers {
            let worker = Worker::new(
                format!("{}-worker-{i}", tenant.tenant_id),
                store.clone(),
                registry.clone(),
                ledger.clone(),
                secrets.clone(),
                tenant_config.clone(),
            );
            let ks = ks.clone();
            let shutdown = supervisor.shutdown_signal();
            supervisor.register(
                format!("worker-{}-{i}", tenant.tenant_id),
                tokio::spawn(async move { worker.run(ks, shutdown).await }),
            );
        }

        for i in 0..tenant.judges {
            let judge = Judge::new(
                store.clone(),
                Committer::new(store.clone(), ledger.clone()),
                decision_log.clone(),
                tenant_config.clone(),
            );
            let ks = ks.clone();
            let shutdown = supervisor.shutdown_signal();
            supervisor.register(
                format!("judge-{}-{i}", tenant.tenant_id),
                tokio::spawn(async move { judge.run(ks, shutdown).await }),
            );
        }

        for perception_config in &tenant.perception {
            let perception = Perception::new(
                store.clone(),
                Arc::new(resource::FileResourceSource::new()),
                tenant_config.clone(),
                &perception_config.campaign_id,
                perception_config.resource_uris.clone(),
            );
            let ks = ks.clone();
            let shutdown = supervisor.shutdown_signal();
            supervisor.register(
                format!("perception-{}-{}", tenant.tenant_id, perception_config.campaign_id),
                tokio::spawn(async move { perception.run(ks, shutdown).await }),
            );
        }
    }

    let state = Arc::new(AppState {
        store: store.clone(),
        planner: Planner::new(store.clone(), config.clone()),
        gate: HitlGate::new(
            store.clone(),
            Committer::new(store, ledger.clone()),
            decision_log,
        ),
        ledger,
        config: config.clone(),
    });
    let app = GatewayServer::build(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HivewireError::Config(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, components = supervisor.component_count(), "hivewire serving");

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(%e, "signal listener failed"),
    }

    supervisor
        .shutdown(Duration::from_secs(config.shutdown_grace_sec))
        .await;
    server.abort();
    info!("clean shutdown");
    Ok(())
}
