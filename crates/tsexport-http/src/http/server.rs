//! Remote-write receiver

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use log::{debug, error, info, trace, warn};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tsexport::{Collector, IngestionFacade};

use super::common::{ErrorResponse, HealthCheckResponse, limits};
use super::remote_write::{decode_write_request, into_records};

pub type AppState = Arc<AppStateInner>;

#[derive(Clone)]
pub struct AppStateInner {
    pub facade: IngestionFacade,
    pub service: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn error_to_status_code(error_code: &str) -> StatusCode {
    match error_code {
        "decode_error" | "invalid_record" => StatusCode::BAD_REQUEST,
        "pool_exhausted" | "pool_timeout" | "pool_closed" | "writer_closed" => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        "storage_error" | "config_error" | "internal_error" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error_response: ErrorResponse) -> HandlerError {
    (
        error_to_status_code(&error_response.error),
        Json(error_response),
    )
}

pub fn create_app_state(collector: &Collector) -> AppState {
    Arc::new(AppStateInner {
        facade: collector.facade().clone(),
        service: collector.config().app.clone(),
    })
}

/// Creates the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/receive", post(receive))
        .route("/api/v1/write", post(receive))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(limits::MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Handles POST /receive and /api/v1/write - one remote-write request
#[tracing::instrument(level = "debug", skip_all, fields(bytes = body.len()))]
pub async fn receive(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, HandlerError> {
    let request = decode_write_request(&body).map_err(|e| {
        warn!("POST remote write rejected: {e}");
        error_reply(ErrorResponse::decode_error(&e.to_string()))
    })?;

    let translation = into_records(request);
    if translation.skipped_series > 0 || translation.skipped_samples > 0 {
        debug!(
            "Skipped {} unnamed series and {} NaN samples",
            translation.skipped_series, translation.skipped_samples
        );
    }

    let facade = app_state.facade.clone();
    let records = translation.records;
    let outcome = tokio::task::spawn_blocking(move || facade.ingest(records)).await;

    match outcome {
        Ok(Ok(summary)) => {
            trace!(
                "POST remote write - accepted {}, rejected {}",
                summary.accepted, summary.rejected
            );
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(Err(e)) => {
            error!("POST remote write failed: {e}");
            Err(error_reply(ErrorResponse::from(&e)))
        }
        Err(e) => {
            error!("POST remote write task failed: {e}");
            Err(error_reply(ErrorResponse::internal_error(
                "ingestion task did not complete",
            )))
        }
    }
}

/// Handles GET /health - health check endpoint
pub async fn health_check(State(app_state): State<AppState>) -> Json<HealthCheckResponse> {
    trace!("GET /health");
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        service: app_state.service.clone(),
        timestamp: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default(),
    })
}

/// Serves remote-write requests on `listener` until `shutdown` resolves,
/// then closes the writer pool so every open file is committed.
pub async fn serve<S>(
    listener: TcpListener,
    collector: Arc<Collector>,
    shutdown: S,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = create_router(create_app_state(&collector));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    info!("Receiver stopped, committing open files");
    tokio::task::spawn_blocking(move || collector.shutdown()).await?;

    served.map_err(|e| format!("Receiver failed: {e}").into())
}

pub async fn start_server(
    collector: Collector,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bind_address = collector.config().listen_addr.clone();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| format!("Failed to bind to address {bind_address}: {e}"))?;
    info!("Remote-write receiver listening on http://{bind_address}/receive");

    serve(listener, Arc::new(collector), shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
