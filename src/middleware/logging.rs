use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Logs every request once it completes, using the `Result<(), ApiError>` a handler
/// attached through [`to_response`].
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let span = tracing::info_span!("request", %request_id);
    let response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    let elapsed = start.elapsed();
    span.in_scope(|| match response.extensions().get::<Result<(), ApiError>>() {
        Some(Ok(())) => info!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request"
        ),
        Some(Err(value)) => error!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            value = %value,
            "Failed to process request"
        ),
        None => warn!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request, but no Response extension is set"
        ),
    });

    response
}

#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    General(String),
    #[error("Database error: {0}")]
    DbError(String),
    #[error("Failed to validate: {0}")]
    ValidationFail(String),
    #[error("Payment provider error: {0}")]
    External(String),
    #[error("Webhook rejected: {0}")]
    Webhook(String),
}

/// Attaches the handler outcome for [`logging_middleware`].
pub fn to_response<T: IntoResponse>(response: T, ext: Result<(), ApiError>) -> Response {
    let mut response = response.into_response();

    response.extensions_mut().insert(ext);

    response
}
