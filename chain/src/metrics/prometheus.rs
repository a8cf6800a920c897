//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed chain metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::warn;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Chain-related Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated by the chain
/// manager as blocks move through the pipeline.
#[derive(Clone)]
pub struct ChainMetrics {
    /// Blocks built and committed by this node.
    pub blocks_created: IntCounter,
    /// Foreign blocks accepted via `receive_block`.
    pub blocks_received: IntCounter,
    /// Foreign blocks rejected, any reason.
    pub blocks_rejected: IntCounter,
    /// Blocks acknowledged by the settlement layer.
    pub blocks_anchored: IntCounter,
    /// Settlement attempts that reported failure.
    pub anchors_failed: IntCounter,
    /// Judgments currently awaiting batching.
    pub pending_judgments: IntGauge,
    /// Latency of building and committing one block, in seconds.
    pub block_build_seconds: Histogram,
}

impl ChainMetrics {
    /// Registers chain metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let blocks_created = IntCounter::with_opts(Opts::new(
            "chain_blocks_created",
            "Total blocks built and committed by this node",
        ))?;
        registry.register(Box::new(blocks_created.clone()))?;

        let blocks_received = IntCounter::with_opts(Opts::new(
            "chain_blocks_received",
            "Total foreign blocks accepted",
        ))?;
        registry.register(Box::new(blocks_received.clone()))?;

        let blocks_rejected = IntCounter::with_opts(Opts::new(
            "chain_blocks_rejected",
            "Total foreign blocks rejected",
        ))?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let blocks_anchored = IntCounter::with_opts(Opts::new(
            "chain_blocks_anchored",
            "Total blocks acknowledged by the settlement layer",
        ))?;
        registry.register(Box::new(blocks_anchored.clone()))?;

        let anchors_failed = IntCounter::with_opts(Opts::new(
            "chain_anchors_failed",
            "Total settlement attempts that failed",
        ))?;
        registry.register(Box::new(anchors_failed.clone()))?;

        let pending_judgments = IntGauge::with_opts(Opts::new(
            "chain_pending_judgments",
            "Judgments currently awaiting batching",
        ))?;
        registry.register(Box::new(pending_judgments.clone()))?;

        let block_build_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chain_block_build_seconds",
                "Time to build and commit one block in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(block_build_seconds.clone()))?;

        Ok(Self {
            blocks_created,
            blocks_received,
            blocks_rejected,
            blocks_anchored,
            anchors_failed,
            pending_judgments,
            block_build_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the chain metrics.
///
/// This is the main handle you pass around in the node. It can be
/// wrapped in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub chain: ChainMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying
    /// `Registry` and registers the chain metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("poj".to_string()), None)?;
        let chain = ChainMetrics::register(&registry)?;
        Ok(Self { registry, chain })
    }

    /// Encodes all metrics in this registry into the Prometheus text
    /// format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        // A single bad accept (e.g. transient EMFILE) should not take
        // the exporter down with it.
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(err) => {
                warn!(error = %err, "metrics listener accept failed");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "metrics connection error");
            }
        });
    }
}

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::GET || req.uri().path() != "/metrics" {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap());
    }

    let body = metrics.gather_text();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, TEXT_FORMAT)
        .body(Full::new(Bytes::from(body)))
        .unwrap())
}
