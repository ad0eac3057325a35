pub mod admin_service;
pub mod auth_service;
pub mod cart_service;
pub mod checkout_service;
pub mod notify;
pub mod order_service;
pub mod pricing;
pub mod reconciliation_service;
pub mod stock;
