//! Push listener: accepts OpenTSDB-style `POST /api/put` bodies and feeds them
//! into a stream collector
//!
//! The body is either a single point or an array of points. Each accepted
//! request becomes one batch on the stream.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::collector::{Collector, StreamSpec};
use crate::datapoint::{DataPoint, MultiDataPoint};
use crate::tags::TagValidator;

/// Inbound batches waiting for the stream collector
const INBOUND_CAPACITY: usize = 100;

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum PutBody {
    One(DataPoint),
    Many(Vec<DataPoint>),
}

impl From<PutBody> for MultiDataPoint {
    fn from(body: PutBody) -> Self {
        match body {
            PutBody::One(dp) => vec![dp],
            PutBody::Many(md) => md,
        }
    }
}

#[derive(Clone)]
struct PutState {
    tx: mpsc::Sender<MultiDataPoint>,
    validator: Arc<dyn TagValidator>,
}

#[derive(Debug)]
enum PutError {
    Invalid(String),
    Unavailable,
}

impl IntoResponse for PutError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PutError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            PutError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "collector is shutting down".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn put(
    State(state): State<PutState>,
    Json(body): Json<PutBody>,
) -> Result<StatusCode, PutError> {
    let md: MultiDataPoint = body.into();

    for dp in &md {
        state
            .validator
            .validate_metric(&dp.metric)
            .and_then(|_| state.validator.validate_tags(&dp.tags))
            .map_err(|e| PutError::Invalid(format!("{}: {e}", dp.metric)))?;
    }

    if md.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }

    debug!("accepted {} points", md.len());
    state.tx.send(md).await.map_err(|_| PutError::Unavailable)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Points are checked with `validator`, normally the context's own.
pub fn router(tx: mpsc::Sender<MultiDataPoint>, validator: Arc<dyn TagValidator>) -> Router {
    Router::new()
        .route("/api/put", post(put))
        .with_state(PutState { tx, validator })
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves until `cancel` fires. Returns the bound address and
/// the receiving end of the inbound stream.
pub async fn spawn_listener(
    addr: SocketAddr,
    validator: Arc<dyn TagValidator>,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, mpsc::Receiver<MultiDataPoint>)> {
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    let app = router(tx, validator);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("listening for pushed points on {local_addr}");

    tokio::spawn(async move {
        let shutdown = cancel.clone();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            error!("listener error: {}", e);
        }
        debug!("listener on {local_addr} stopped");
    });

    Ok((local_addr, rx))
}

/// Stream collector named `listener` that binds `addr` when started.
pub fn collector(addr: SocketAddr, validator: Arc<dyn TagValidator>) -> Collector {
    Collector::stream(
        "listener",
        StreamSpec::new(move |cancel| {
            let validator = Arc::clone(&validator);
            async move {
                let (bound, rx) =
                    spawn_listener(addr, validator, cancel).await.inspect_err(|e| {
                        warn!("failed to bind {addr}: {e:#}");
                    })?;
                debug!("stream source ready on {bound}");
                Ok::<_, anyhow::Error>(rx)
            }
        }),
    )
}
