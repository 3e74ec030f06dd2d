use alloy_provider::ProviderBuilder;
use anyhow::{Result, anyhow, bail};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use ledger_indexer::indexer::{ChainClient, RpcChainClient};
use ledger_indexer::metrics::Metrics;
use ledger_indexer::models::common::Config;
use ledger_indexer::models::datasets::events::DecodedEvent;
use ledger_indexer::storage::postgres::PostgresStore;
use ledger_indexer::sync::blocks::BlockSync;
use ledger_indexer::sync::{HeaderSync, validate_header_sync_args};
use ledger_indexer::transformer::abi::AbiEventConverter;
use ledger_indexer::transformer::fetcher::ChainLogFetcher;
use ledger_indexer::transformer::watcher::EventWatcher;
use ledger_indexer::transformer::EventTransformer;
use ledger_indexer::utils::load_config;

const DEFAULT_CONFIG: &str = "config.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    HeaderSync,
    FullSync,
    Execute,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "header-sync" => Ok(Mode::HeaderSync),
            "full-sync" => Ok(Mode::FullSync),
            "execute" => Ok(Mode::Execute),
            other => Err(anyhow!(
                "unknown mode {other:?}, expected `header-sync`, `full-sync` or `execute`"
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut args = std::env::args().skip(1);
    let mode: Mode = match args.next() {
        Some(mode) => mode.parse()?,
        None => bail!("usage: ledger-indexer <header-sync|full-sync|execute> [config.yml]"),
    };
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    info!("=========================== INITIALIZING ===========================");

    let config = match load_config(&config_path) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(e);
        }
    };

    let rpc_url: Url = config.rpc_url.parse()?;
    let node_label = rpc_url.host_str().unwrap_or("unknown").to_string();

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new(node_label)?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    let provider = ProviderBuilder::new().connect_http(rpc_url);
    let client = RpcChainClient::connect(provider, &config.rpc_url, metrics.clone()).await?;
    info!(
        "Connected to {} node {} (network {})",
        client.node().client_name,
        client.node().id,
        client.node().network_id
    );
    let fingerprint = client.node().fingerprint().to_string();
    let chain: Arc<dyn ChainClient> = Arc::new(client);

    let store = PostgresStore::connect(&config.database, fingerprint).await?;
    store.migrate().await?;

    // Stop every loop on Ctrl+C; loops finish their current header or pass first
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, initiating shutdown...");
            shutdown.cancel();
        }
    });

    info!("========================= STARTING {:?} =========================", mode);

    match mode {
        Mode::HeaderSync => run_header_sync(&config, chain, store, metrics, cancel).await,
        Mode::FullSync => run_full_sync(&config, chain, store, metrics, cancel).await,
        Mode::Execute => run_transformers(&config, chain, store, metrics, cancel).await,
    }
}

async fn run_header_sync(
    config: &Config,
    chain: Arc<dyn ChainClient>,
    store: PostgresStore,
    metrics: Option<Arc<Metrics>>,
    cancel: CancellationToken,
) -> Result<()> {
    let sync = HeaderSync::new(chain, Arc::new(store), config.header_sync.clone(), metrics);
    sync.run(cancel).await?;
    Ok(())
}

// Shares the starting block and polling interval of header sync
async fn run_full_sync(
    config: &Config,
    chain: Arc<dyn ChainClient>,
    store: PostgresStore,
    metrics: Option<Arc<Metrics>>,
    cancel: CancellationToken,
) -> Result<()> {
    let starting_block = config.header_sync.starting_block_number;
    validate_header_sync_args(chain.as_ref(), starting_block).await?;

    let sync = BlockSync::new(chain, Arc::new(store), config.rewards).with_metrics(metrics);
    sync.run(
        starting_block,
        Duration::from_secs(config.header_sync.polling_interval_secs),
        cancel,
    )
    .await;
    Ok(())
}

async fn run_transformers(
    config: &Config,
    chain: Arc<dyn ChainClient>,
    store: PostgresStore,
    metrics: Option<Arc<Metrics>>,
    cancel: CancellationToken,
) -> Result<()> {
    if config.transformers.is_empty() {
        bail!("no transformers configured");
    }

    let mut watcher = EventWatcher::new(config.execute.clone());
    for transformer_config in &config.transformers {
        let converter = AbiEventConverter::new(transformer_config)?;
        let repository = store
            .event_repository::<DecodedEvent>(transformer_config)
            .await?;
        let transformer = EventTransformer::new(
            transformer_config.clone(),
            ChainLogFetcher::new(Arc::clone(&chain)),
            converter,
            repository,
        )
        .with_metrics(metrics.clone());

        info!(
            "Registered transformer {} from block {}",
            transformer_config.event_name, transformer_config.starting_block_number
        );
        watcher.add_transformer(Arc::new(transformer));
    }

    watcher.run(cancel).await?;
    Ok(())
}
