//! SafeRoute gateway - safe route selection and presence broadcast
//!
//! Ranks walking route candidates by a weighted safety score and keeps a
//! live presence registry with proximity matching and emergency fan-out.
//!
//! Module structure:
//! - `domain/` - Core types and geo math (Location, Session, haversine)
//! - `io/` - External interfaces (presence transport, HTTP API, providers)
//! - `services/` - Business logic (hub, registry, scoring, selection)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use saferoute_gateway::infra::{Config, Metrics};
use saferoute_gateway::io::{
    start_http_server, start_presence_listener, ApiContext, FeatureKind, OsrmClient,
    OverpassClient, TrafficFlowClient,
};
use saferoute_gateway::services::{
    BroadcastDispatcher, PresenceHub, PresenceRegistry, RouteSelector, SafetyScoreAggregator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// SafeRoute gateway - safety-scored routing and presence broadcast
#[derive(Parser, Debug)]
#[command(name = "saferoute-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("saferoute-gateway starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        presence_port = %config.presence_port(),
        http_port = %config.http_port(),
        routing_url = %config.routing_url(),
        traffic_configured = %config.traffic_api_key().is_some(),
        session_ttl_hours = %(config.session_ttl().num_hours()),
        alert_file = %config.alert_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(PresenceRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(metrics.clone()));

    // Provider clients for the scoring pipeline and the route API
    let provider_timeout = Duration::from_millis(config.provider_timeout_ms());
    let routing = Arc::new(OsrmClient::new(
        config.routing_url(),
        Duration::from_millis(config.routing_timeout_ms()),
    ));
    let traffic = Arc::new(TrafficFlowClient::new(
        config.traffic_url(),
        config.traffic_api_key(),
        provider_timeout,
    ));
    let cctv = Arc::new(OverpassClient::new(
        config.overpass_url(),
        FeatureKind::Cctv,
        provider_timeout,
    ));
    let infrastructure = Arc::new(OverpassClient::new(
        config.overpass_url(),
        FeatureKind::Infrastructure,
        provider_timeout,
    ));

    let aggregator = Arc::new(SafetyScoreAggregator::new(
        traffic,
        cctv.clone(),
        infrastructure.clone(),
        provider_timeout,
        metrics.clone(),
    ));
    let selector = Arc::new(RouteSelector::new(aggregator));

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(config.event_buffer());

    // Start presence TCP listener
    let listener_config = config.clone();
    let listener_metrics = metrics.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            start_presence_listener(listener_config, event_tx, listener_metrics, listener_shutdown)
                .await
        {
            tracing::error!(error = %e, "presence listener error");
        }
    });

    // Start HTTP API server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let ctx = Arc::new(ApiContext {
            routing,
            selector,
            cctv,
            infrastructure,
            metrics: metrics.clone(),
            site_id: config.site_id().to_string(),
        });
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(http_port, ctx, http_shutdown).await {
                tracing::error!(error = %e, "HTTP server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Start hub (main event processing loop)
    let mut hub = PresenceHub::new(config, registry, dispatcher, metrics);
    info!("hub_started");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run hub - consumes events until channel closes
    hub.run(event_rx).await;

    info!("saferoute-gateway shutdown complete");
    Ok(())
}
