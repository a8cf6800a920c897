// src/main.rs
//
// Minimal demo node that wires up the chain library:
//
// - RocksDB-backed storage (via the configured backend)
// - Operator registry with a freshly generated self identity
// - Tokio-backed batch timer
// - Prometheus metrics exporter on /metrics
// - Simple loop that feeds synthetic judgments at a fixed interval.

use std::{sync::Arc, time::Duration};

use poj_chain::{
    ChainManager, JudgmentDraft, MetricsRegistry, OperatorRegistry, PojConfig, SelfOperatorSpec,
    TokioBatchTimer, run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run_node().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // For now, just use defaults. Later you can load from a file/CLI/env.
    let cfg = PojConfig::default();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let exporter = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(exporter, addr).await {
                tracing::warn!(error = %e, "metrics exporter stopped");
            }
        });
        tracing::info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Storage + operator identity
    // ---------------------------

    let store = cfg
        .store
        .open()
        .map_err(|e| format!("failed to open chain store: {e}"))?;

    let mut registry = OperatorRegistry::new(cfg.registry);
    let self_info = registry
        .initialize_self(SelfOperatorSpec {
            name: Some("demo-node".to_string()),
            ..SelfOperatorSpec::default()
        })
        .map_err(|e| format!("failed to initialise operator identity: {e}"))?;
    tracing::info!(operator = %self_info.public_key, "operator identity ready");

    // ---------------------------
    // Chain manager
    // ---------------------------

    let (timer, mut timer_ticks) = TokioBatchTimer::new();
    let mut manager = ChainManager::new(cfg.manager, store, timer)
        .with_registry(registry)
        .with_metrics(metrics);
    manager
        .initialize()
        .map_err(|e| format!("failed to initialise chain: {e}"))?;
    let head_slot = manager.head().map(|b| b.header.slot);
    tracing::info!(?head_slot, "chain ready");

    // ---------------------------
    // Demo judgment feed
    // ---------------------------

    let mut feed = tokio::time::interval(Duration::from_secs(2));
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = feed.tick() => {
                sequence += 1;
                let draft = JudgmentDraft {
                    judgment_id: Some(format!("demo-{sequence}")),
                    q_score: Some((sequence % 101) as u8),
                    verdict: Some("observed".to_string()),
                    timestamp: None,
                };
                if let Some(block) = manager.add_judgment(draft) {
                    tracing::info!(
                        slot = block.header.slot,
                        judgments = block.judgment_count(),
                        "block committed"
                    );
                }
            }
            Some(()) = timer_ticks.recv() => {
                if let Some(block) = manager.on_batch_timer() {
                    tracing::info!(
                        slot = block.header.slot,
                        judgments = block.judgment_count(),
                        "batch timeout committed a block"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                manager.close();
                break;
            }
        }
    }

    Ok(())
}
