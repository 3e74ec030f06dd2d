use std::sync::Arc;
use tracing::{error, info};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub node_name: String,

    // Header sync metrics
    pub chain_head: Gauge<u64>,
    pub headers_populated: Counter<u64>,
    pub headers_replaced: Counter<u64>,
    pub validation_window_upper: Gauge<u64>,

    // Transformer metrics
    pub headers_checked: Counter<u64>,
    pub models_persisted: Counter<u64>,

    // Cold import metrics
    pub blocks_imported: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(node_name: String) -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("ledger_indexer_metrics");

        let chain_head = meter
            .u64_gauge("ledger_chain_head_block_number")
            .with_description("Latest block number reported by the node")
            .build();

        let headers_populated = meter
            .u64_counter("ledger_headers_populated")
            .with_description("Headers inserted by backfill")
            .build();

        let headers_replaced = meter
            .u64_counter("ledger_headers_replaced")
            .with_description("Stored headers overwritten after a reorg")
            .build();

        let validation_window_upper = meter
            .u64_gauge("ledger_validation_window_upper")
            .with_description("Upper bound of the last validated header window")
            .build();

        let headers_checked = meter
            .u64_counter("ledger_headers_checked")
            .with_description("Headers marked checked by a transformer")
            .build();

        let models_persisted = meter
            .u64_counter("ledger_event_models_persisted")
            .with_description("Event models committed by a transformer")
            .build();

        let blocks_imported = meter
            .u64_counter("ledger_blocks_imported")
            .with_description("Blocks written by block sync and the cold importer")
            .build();

        let rpc_requests = meter
            .u64_counter("ledger_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("ledger_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("ledger_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            node_name,
            chain_head,
            headers_populated,
            headers_replaced,
            validation_window_upper,
            headers_checked,
            models_persisted,
            blocks_imported,
            rpc_requests,
            rpc_errors,
            rpc_latency,
        })
    }

    pub fn labels(&self, method: &'static str) -> [KeyValue; 2] {
        [
            KeyValue::new("node", self.node_name.clone()),
            KeyValue::new("method", method),
        ]
    }

    pub fn event_labels(&self, event: &str) -> [KeyValue; 2] {
        [
            KeyValue::new("node", self.node_name.clone()),
            KeyValue::new("event", event.to_string()),
        ]
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().to_string() == "0.0.0.0" {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics server to {addr}"))?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
