//! HTTP front end
//!
//! The whole service is one function: every path lands in the same handler,
//! which dispatches on the method only.

use crate::{ErrorResponse, FetchRequest, FetchSubtitlesError, SubtitleService};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use log::{error, info};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Errors that can occur while running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket
    #[error("Failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    /// The server stopped with an I/O error
    #[error("Server error: {0}")]
    Serve(#[from] io::Error),
}

/// Builds the router serving `fetch_subtitles` on every path
pub fn router(service: Arc<SubtitleService>) -> Router {
    Router::new().fallback(fetch_subtitles).with_state(service)
}

/// Binds `address` and serves until Ctrl-C or SIGTERM
pub async fn serve(address: &str, service: Arc<SubtitleService>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| ServerError::Bind {
            address: address.to_string(),
            source: e,
        })?;

    info!("Serving fetch_subtitles on http://{}", address);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn fetch_subtitles(
    State(service): State<Arc<SubtitleService>>,
    method: Method,
    body: Bytes,
) -> Response {
    match method {
        Method::GET | Method::HEAD => Json(service.health()).into_response(),
        Method::POST => handle_post(service, &body).await,
        _ => (StatusCode::METHOD_NOT_ALLOWED, "Use POST with JSON body.").into_response(),
    }
}

async fn handle_post(service: Arc<SubtitleService>, body: &[u8]) -> Response {
    let request = FetchRequest::from_body(body);
    if request.target().is_none() {
        return bad_request();
    }

    // Sources block on HTTP and subprocesses
    let result = tokio::task::spawn_blocking(move || service.fetch(&request)).await;

    match result {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            error!("[REQ] worker failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Missing 'url' or 'id'").into_response()
}

fn error_response(error: FetchSubtitlesError) -> Response {
    let status = match &error {
        FetchSubtitlesError::MissingTarget => return bad_request(),
        FetchSubtitlesError::NoSubtitles { .. } => StatusCode::NOT_FOUND,
        FetchSubtitlesError::Fallback { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = ErrorResponse {
        ok: false,
        video_id: error.video_id().unwrap_or_default().to_string(),
        error: error.to_string(),
    };

    (status, Json(body)).into_response()
}
