use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BeginCheckoutRequest {
    pub coupon_code: Option<String>,
}

/// Redirect target for the client; the order itself is only materialized
/// once the provider confirms payment.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub url: String,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}
