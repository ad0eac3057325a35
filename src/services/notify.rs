use serde_json::json;

use crate::config::AppConfig;
use crate::entity::orders::Model as OrderModel;

/// Best-effort outbound notifications (chat-style webhook). These run after
/// the business mutation has committed; a failure here is logged and
/// swallowed, never surfaced to the caller.
pub async fn order_created(config: &AppConfig, order: &OrderModel) {
    send(
        config,
        json!({
            "text": format!(
                "Order {} confirmed: {} minor units ({} items total discount {})",
                order.invoice_number, order.total_amount, order.subtotal, order.discount
            ),
            "order_id": order.id,
        }),
    )
    .await;
}

pub async fn order_cancelled(config: &AppConfig, order: &OrderModel) {
    send(
        config,
        json!({
            "text": format!("Order {} cancelled, stock restored", order.invoice_number),
            "order_id": order.id,
        }),
    )
    .await;
}

async fn send(config: &AppConfig, payload: serde_json::Value) {
    let Some(url) = config.notify_webhook_url.as_deref() else {
        return;
    };

    let result = reqwest::Client::new().post(url).json(&payload).send().await;
    match result {
        Ok(resp) if !resp.status().is_success() => {
            tracing::warn!(status = %resp.status(), "notification webhook rejected payload");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(error = %err, "notification webhook failed");
        }
    }
}
