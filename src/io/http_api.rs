//! HTTP API - route computation, map layers, health, and metrics
//!
//! Exposes the safe-route endpoint, the map layer endpoints, and gateway
//! metrics in Prometheus text format. Uses hyper for the HTTP server.

use crate::domain::geo::within_bbox;
use crate::domain::types::Location;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::io::providers::{BBox, FeatureCountProvider, ProviderError, RoutingProvider};
use crate::services::route_selector::RouteSelector;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shared handles for the HTTP request handlers
pub struct ApiContext {
    pub routing: Arc<dyn RoutingProvider>,
    pub selector: Arc<RouteSelector>,
    pub cctv: Arc<dyn FeatureCountProvider>,
    pub infrastructure: Arc<dyn FeatureCountProvider>,
    pub metrics: Arc<Metrics>,
    pub site_id: String,
}

#[derive(Debug, Deserialize)]
struct RouteRequest {
    start_location: Location,
    end_location: Location,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "saferoute_events_total",
        "Total presence events processed",
        MetricType::Counter,
        site,
        summary.events_total,
    );
    let _ = writeln!(output, "# HELP saferoute_events_per_sec Events processed per second");
    let _ = writeln!(output, "# TYPE saferoute_events_per_sec gauge");
    let _ = writeln!(
        output,
        "saferoute_events_per_sec{{site=\"{site}\"}} {:.2}",
        summary.events_per_sec
    );

    write_metric(
        &mut output,
        "saferoute_active_sessions",
        "Current active presence sessions",
        MetricType::Gauge,
        site,
        summary.active_sessions,
    );
    write_metric(
        &mut output,
        "saferoute_inbound_rejected_total",
        "Inbound messages rejected at the boundary",
        MetricType::Counter,
        site,
        summary.inbound_rejected_total,
    );
    write_metric(
        &mut output,
        "saferoute_inbound_dropped_total",
        "Inbound messages dropped due to hub channel full",
        MetricType::Counter,
        site,
        summary.inbound_dropped_total,
    );
    write_metric(
        &mut output,
        "saferoute_routes_scored_total",
        "Route candidates scored",
        MetricType::Counter,
        site,
        summary.routes_scored_total,
    );
    write_metric(
        &mut output,
        "saferoute_traffic_fallbacks_total",
        "Traffic provider fallback substitutions",
        MetricType::Counter,
        site,
        summary.traffic_fallbacks_total,
    );
    write_metric(
        &mut output,
        "saferoute_cctv_fallbacks_total",
        "Camera provider fallback substitutions",
        MetricType::Counter,
        site,
        summary.cctv_fallbacks_total,
    );
    write_metric(
        &mut output,
        "saferoute_crowd_fallbacks_total",
        "Infrastructure provider fallback substitutions",
        MetricType::Counter,
        site,
        summary.crowd_fallbacks_total,
    );
    write_metric(
        &mut output,
        "saferoute_broadcasts_total",
        "Outbound messages targeted at connections",
        MetricType::Counter,
        site,
        summary.broadcasts_total,
    );
    write_metric(
        &mut output,
        "saferoute_broadcast_drops_total",
        "Outbound messages dropped due to channel full",
        MetricType::Counter,
        site,
        summary.broadcast_drops_total,
    );
    write_metric(
        &mut output,
        "saferoute_emergency_alerts_total",
        "Emergency alerts fanned out",
        MetricType::Counter,
        site,
        summary.emergency_alerts_total,
    );
    write_metric(
        &mut output,
        "saferoute_unknown_user_total",
        "Operations referencing a user with no session",
        MetricType::Counter,
        site,
        summary.unknown_user_total,
    );
    write_metric(
        &mut output,
        "saferoute_sessions_swept_total",
        "Sessions removed by the inactivity sweep",
        MetricType::Counter,
        site,
        summary.sessions_swept_total,
    );

    output
}

/// Parse `min_lon,min_lat,max_lon,max_lat` from the bbox query parameter
fn parse_bbox(query: Option<&str>) -> Option<BBox> {
    let query = query?;
    let raw = query.split('&').find_map(|kv| kv.strip_prefix("bbox="))?;
    let parts: Vec<f64> = raw.split(',').map(str::parse).collect::<Result<_, _>>().ok()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
        return None;
    };
    if min_lon > max_lon || min_lat > max_lat {
        return None;
    }
    Some((*min_lon, *min_lat, *max_lon, *max_lat))
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, code: &str) -> Response<Full<Bytes>> {
    json_response(status, format!(r#"{{"error":"{code}"}}"#))
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: Arc<ApiContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&ctx.metrics.report(), &ctx.site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        (&Method::POST, "/api/route") => Ok(handle_route(req, &ctx).await),
        (&Method::GET, "/api/cctv") => {
            let bbox = parse_bbox(req.uri().query());
            Ok(handle_layer(bbox, ctx.cctv.as_ref(), "cctv").await)
        }
        (&Method::GET, "/api/infrastructure") => {
            let bbox = parse_bbox(req.uri().query());
            Ok(handle_layer(bbox, ctx.infrastructure.as_ref(), "infrastructure").await)
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// POST /api/route - fetch candidates, score, and return the winner
async fn handle_route(req: Request<hyper::body::Incoming>, ctx: &ApiContext) -> Response<Full<Bytes>> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "route_body_read_failed");
            return error_response(StatusCode::BAD_REQUEST, "invalid_body");
        }
    };

    let request: RouteRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "route_request_parse_failed");
            return error_response(StatusCode::BAD_REQUEST, "invalid_request");
        }
    };

    if request.start_location.validate().is_err() || request.end_location.validate().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_coordinates");
    }

    let candidates = match ctx
        .routing
        .fetch_candidates(&request.start_location, &request.end_location)
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(error = %e, "routing_provider_failed");
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "routing_unavailable");
        }
    };

    match ctx.selector.select(candidates).await {
        Ok(scored) => match serde_json::to_string(&scored) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                error!(error = %e, "route_serialize_failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        },
        Err(_) => error_response(StatusCode::NOT_FOUND, "no_route_available"),
    }
}

/// GET /api/cctv and /api/infrastructure - map layer features in a bbox
///
/// Provider failure degrades to an empty layer rather than an error; the
/// map renders without the overlay.
async fn handle_layer(
    bbox: Option<BBox>,
    provider: &dyn FeatureCountProvider,
    layer: &str,
) -> Response<Full<Bytes>> {
    let Some(bbox) = bbox else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_bbox");
    };

    let mut features = match provider.features_in_bbox(bbox).await {
        Ok(features) => features,
        Err(e) => {
            match e {
                ProviderError::NotConfigured => {}
                _ => warn!(layer = %layer, error = %e, "layer_provider_failed"),
            }
            Vec::new()
        }
    };
    // Providers may return features slightly outside the requested area
    let (min_lon, min_lat, max_lon, max_lat) = bbox;
    features.retain(|p| within_bbox(p, min_lon, min_lat, max_lon, max_lat));

    let body = serde_json::json!({
        "count": features.len(),
        "features": features,
    });
    json_response(StatusCode::OK, body.to_string())
}

/// Start the HTTP API server
pub async fn start_http_server(
    port: u16,
    ctx: Arc<ApiContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, site = %ctx.site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ctx = ctx.clone();
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_event_processed();
        metrics.record_route_scored();
        metrics.record_emergency_alert();
        metrics.set_active_sessions(4);

        let output = format_prometheus_metrics(&metrics.report(), "reykjavik");

        assert!(output.contains("saferoute_events_total{site=\"reykjavik\"} 1"));
        assert!(output.contains("saferoute_routes_scored_total{site=\"reykjavik\"} 1"));
        assert!(output.contains("saferoute_emergency_alerts_total{site=\"reykjavik\"} 1"));
        assert!(output.contains("saferoute_active_sessions{site=\"reykjavik\"} 4"));
    }

    #[test]
    fn test_parse_bbox_valid() {
        let bbox = parse_bbox(Some("bbox=-21.95,64.13,-21.90,64.15")).unwrap();
        assert_eq!(bbox, (-21.95, 64.13, -21.90, 64.15));

        // Other query parameters are ignored
        let bbox = parse_bbox(Some("zoom=14&bbox=0,0,1,1")).unwrap();
        assert_eq!(bbox, (0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_parse_bbox_rejects_malformed() {
        assert!(parse_bbox(None).is_none());
        assert!(parse_bbox(Some("zoom=14")).is_none());
        assert!(parse_bbox(Some("bbox=1,2,3")).is_none());
        assert!(parse_bbox(Some("bbox=a,b,c,d")).is_none());
        // Inverted corners
        assert!(parse_bbox(Some("bbox=1,1,0,0")).is_none());
    }

    #[test]
    fn test_route_request_parses() {
        let json = r#"{
            "start_location": {"lat": 64.14, "lon": -21.94},
            "end_location": {"lat": 64.15, "lon": -21.90}
        }"#;
        let request: RouteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.start_location.lat, 64.14);
        assert_eq!(request.end_location.lon, -21.90);
    }
}
