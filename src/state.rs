use crate::config::AppConfig;
use crate::db::{DbPool, OrmConn};
use crate::payments::client::PaymentClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub payments: PaymentClient,
    pub config: AppConfig,
}
