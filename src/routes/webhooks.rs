use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    payments::{events::PaymentEvent, signature},
    services::reconciliation_service::{self, ReconcileOutcome},
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Inbound payment-provider callback. The signature covers the raw body and
/// is checked before any of the untrusted payload is parsed. Redelivery of a
/// session the handler has already processed is acknowledged as success so
/// the provider stops retrying.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    request_body = String,
    responses(
        (status = 200, description = "Event processed (or already processed)"),
        (status = 400, description = "Missing or invalid signature, or malformed payload"),
        (status = 500, description = "Processing failed after payment capture; provider should retry"),
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::SignatureInvalid)?;

    let verified = signature::verify(
        header,
        &body,
        &state.config.payments.webhook_secret,
        state.config.payments.webhook_tolerance_secs,
        Utc::now().timestamp(),
    );
    if !verified {
        tracing::warn!("payment webhook signature verification failed");
        return Err(AppError::SignatureInvalid);
    }

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid payload: {e}")))?;

    let outcome = reconciliation_service::on_payment_confirmed(&state, event).await?;
    if let ReconcileOutcome::Created { order_id } = outcome {
        tracing::info!(%order_id, "payment webhook produced an order");
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "received": true })),
    ))
}
