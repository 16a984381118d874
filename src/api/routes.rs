use std::any::Any;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::Method,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::models::SummaryRequest;
use crate::api::response;
use crate::error::{AppError, Result};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/summary",
            post(summary_handler).fallback(method_not_allowed),
        )
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
        .with_state(app_state)
}

async fn summary_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let start_time = Instant::now();
    let result = process_summary_request(&state, &body).await;
    let elapsed = start_time.elapsed();

    match result {
        Ok(summary) => {
            tracing::info!(?elapsed, "summary request succeeded");
            response::success(summary)
        }
        Err(err) => {
            if err.status().is_client_error() {
                tracing::warn!(?elapsed, status = err.status().as_u16(), error = %err, "summary request rejected");
            } else {
                tracing::error!(?elapsed, status = err.status().as_u16(), error = ?err, "summary request failed");
            }
            err.into_response()
        }
    }
}

async fn process_summary_request(state: &AppState, body: &[u8]) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "request body is not valid JSON");
        AppError::InvalidBody
    })?;

    // serde would also fill the struct from a positional array.
    if !value.is_object() {
        tracing::debug!("request body is not a JSON object");
        return Err(AppError::InvalidBody);
    }

    let req: SummaryRequest = serde_json::from_value(value).map_err(|e| {
        tracing::debug!(error = %e, "request body has an unexpected shape");
        AppError::InvalidBody
    })?;

    tracing::info!(url = ?req.url, "processing summary request");
    state.pipeline.run(req.url.as_deref()).await
}

async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(%details, "request handler panicked");
    AppError::Unexpected(details).into_response()
}
