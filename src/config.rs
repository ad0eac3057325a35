use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub payments: PaymentConfig,
    /// Optional chat-style webhook hit after order creation/cancellation.
    pub notify_webhook_url: Option<String>,
}

/// Settings for the external payment provider.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub success_url: String,
    pub cancel_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let payments = PaymentConfig {
            api_base: env::var("PAYMENT_API_BASE")
                .unwrap_or_else(|_| "https://api.payments.example".to_string()),
            secret_key: env::var("PAYMENT_SECRET_KEY").unwrap_or_default(),
            webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            webhook_tolerance_secs: env::var("PAYMENT_WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(300),
            success_url: env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| "http://localhost:3000/checkout/success".to_string()),
            cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:3000/checkout/cancel".to_string()),
        };

        let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL").ok().filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            host,
            port,
            payments,
            notify_webhook_url,
        })
    }
}
