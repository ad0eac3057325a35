use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_COMPLETED: &str = "checkout.session.completed";

/// Webhook envelope posted by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionObject {
    /// Provider session id; the idempotency key for reconciliation.
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    pub metadata: SessionMetadata,
}

/// Correlation data we attach to the outbound session request; the provider
/// echoes it back verbatim. This is the only channel telling reconciliation
/// which user and pricing the session belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub user_id: Uuid,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub discount: i64,
    pub total: i64,
}
