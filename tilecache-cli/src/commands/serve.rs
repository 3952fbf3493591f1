//! HTTP tile service.
//!
//! Exposes one retrieval operation, `GET /tile?lat=<int>&lon=<int>`, with
//! both parameters in hundredths of a degree. Successful responses carry
//! the encoded tile as an octet-stream; errors map by class: bad or missing
//! parameters are 400, upstream fetch failures 502, everything else 500.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Args;
use serde::Deserialize;
use tracing::info;

use tilecache::fetch::{OverpassSource, ReqwestClient, DEFAULT_OVERPASS_URL};
use tilecache::telemetry::ServiceMetrics;
use tilecache::{TileError, TileService};

use super::{CommandError, TransformKind};

/// Arguments for the `serve` subcommand.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Overpass interpreter endpoint to fetch map data from.
    #[arg(long, default_value = DEFAULT_OVERPASS_URL)]
    overpass_url: String,

    /// Upper bound for a single upstream fetch, in seconds.
    #[arg(long, default_value_t = 30)]
    fetch_timeout: u64,

    /// Path to the persistent tile store. Uses an in-memory store when
    /// omitted.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Custom serialization transform to apply to every tile.
    #[arg(long, value_enum)]
    transform: Option<TransformKind>,
}

/// Run the HTTP service until ctrl-c.
pub async fn run(args: ServeArgs) -> Result<(), CommandError> {
    let store = super::open_store(args.store).await?;
    let http = Arc::new(ReqwestClient::with_timeout(Duration::from_secs(
        args.fetch_timeout,
    ))?);
    let source = Arc::new(OverpassSource::new(http).with_url(args.overpass_url));

    let metrics = Arc::new(ServiceMetrics::new());
    let mut service = TileService::new(store, source).with_metrics(Arc::clone(&metrics));
    if let Some(kind) = args.transform {
        service = service.with_transform(kind.transform());
    }

    let app = Router::new()
        .route("/tile", get(get_tile))
        .with_state(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, "Tile service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let snapshot = metrics.snapshot();
    info!(
        cache_hits = snapshot.cache_hits,
        cache_misses = snapshot.cache_misses,
        tiles_created = snapshot.tiles_created,
        "Tile service stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Query parameters of the tile endpoint.
///
/// Both arrive as raw strings so that missing and unparseable values can be
/// reported distinctly, matching the service's client-error contract.
#[derive(Debug, Deserialize)]
struct TileParams {
    lat: Option<String>,
    lon: Option<String>,
}

/// Parse raw query parameters into hundredths-of-a-degree integers.
fn parse_params(params: &TileParams) -> Result<(i32, i32), String> {
    let (lat, lon) = match (&params.lat, &params.lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err("missing query parameter \"lat\" or \"lon\"".to_owned()),
    };
    let lat = lat
        .parse::<i32>()
        .map_err(|_| format!("unparseable latitude {lat:?}"))?;
    let lon = lon
        .parse::<i32>()
        .map_err(|_| format!("unparseable longitude {lon:?}"))?;
    Ok((lat, lon))
}

async fn get_tile(
    State(service): State<Arc<TileService>>,
    Query(params): Query<TileParams>,
) -> Response {
    let (lat, lon) = match parse_params(&params) {
        Ok(parsed) => parsed,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    match service.get_tile(lat, lon).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            let status = match &e {
                TileError::Coord(_) => StatusCode::BAD_REQUEST,
                TileError::Fetch(_) => StatusCode::BAD_GATEWAY,
                TileError::Codec(_) | TileError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string()).into_response()
        }
    }
}
