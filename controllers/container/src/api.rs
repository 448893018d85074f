//! HTTP API
//!
//! Routers resolve functions to backend addresses here and report traffic so
//! busy functions are not reaped. Probes and metrics are served alongside.

use crate::error::ControllerError;
use crate::executor::Executor;
use crate::metrics::ExecutorMetrics;
use crate::validation::validate_function;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crds::Function;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn Executor>,
    pub metrics: ExecutorMetrics,
    pub ready: Arc<AtomicBool>,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v2/getServiceForFunction", post(get_service_for_function))
        .route("/v2/tapServices", post(tap_services))
        .route("/v2/dumpDebugInfo", post(dump_debug_info))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until the task is aborted
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Address of a backend serving `function`.
///
/// A cached backend is reused when its objects still exist; a stale entry is
/// evicted and the backend created again.
pub async fn service_for_function(executor: &dyn Executor, function: &Function) -> Result<String, ControllerError> {
    match executor.get_func_svc_from_cache(function) {
        Ok(fsvc) => {
            if executor.is_valid(&fsvc).await {
                return Ok(fsvc.address);
            }
            debug!("Evicting stale backend of {}", function.display_name());
            executor.delete_func_svc_from_cache(&fsvc);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    let fsvc = executor.get_func_svc(function).await?;
    Ok(fsvc.address)
}

async fn get_service_for_function(State(state): State<AppState>, Json(function): Json<Function>) -> Response {
    if function.executor_type() != state.executor.executor_type() {
        return (
            StatusCode::BAD_REQUEST,
            format!("{} is not served by this executor", function.display_name()),
        )
            .into_response();
    }
    if let Err(e) = validate_function(&function) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match service_for_function(state.executor.as_ref(), &function).await {
        Ok(address) => address.into_response(),
        Err(e) => {
            let status = if e.is_invalid_function() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, e.to_string()).into_response()
        }
    }
}

async fn tap_services(State(state): State<AppState>, Json(addresses): Json<Vec<String>>) -> StatusCode {
    for address in &addresses {
        if let Err(e) = state.executor.tap_service(address).await {
            if e.is_not_found() {
                debug!("Tapped unknown address {}", address);
            } else {
                warn!("Error tapping {}: {}", address, e);
            }
        }
    }
    StatusCode::OK
}

async fn dump_debug_info(State(state): State<AppState>) -> Response {
    match state.executor.dump_debug_info().await {
        Ok(path) => path.display().to_string().into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::Acquire) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for function watch to sync")
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => text.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
