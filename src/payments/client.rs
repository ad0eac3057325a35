use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::error::AppError;
use crate::payments::events::SessionMetadata;

/// One line per cart entry, amounts in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLineItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    mode: &'static str,
    line_items: &'a [SessionLineItem],
    success_url: &'a str,
    cancel_url: &'a str,
    metadata: &'a SessionMetadata,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Thin client for the external payment provider's session API.
#[derive(Clone)]
pub struct PaymentClient {
    http: reqwest::Client,
    config: PaymentConfig,
}

impl PaymentClient {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn create_session(
        &self,
        line_items: &[SessionLineItem],
        metadata: &SessionMetadata,
    ) -> Result<CheckoutSession, AppError> {
        let body = CreateSessionBody {
            mode: "payment",
            line_items,
            success_url: &self.config.success_url,
            cancel_url: &self.config.cancel_url,
            metadata,
        };

        let url = format!("{}/v1/checkout/sessions", self.config.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, "payment session creation rejected");
            return Err(AppError::ExternalFailure(format!(
                "session creation failed with status {status}"
            )));
        }

        resp.json::<CheckoutSession>()
            .await
            .map_err(|e| AppError::ExternalFailure(e.to_string()))
    }
}
