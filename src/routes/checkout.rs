use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::checkout::{BeginCheckoutRequest, CheckoutSessionResponse},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::checkout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/session", post(create_session))
}

#[utoipa::path(
    post,
    path = "/api/checkout/session",
    request_body = BeginCheckoutRequest,
    responses(
        (status = 200, description = "Payment session created, redirect the client", body = ApiResponse<CheckoutSessionResponse>),
        (status = 400, description = "Empty cart or coupon not applicable"),
        (status = 404, description = "Coupon code not found"),
        (status = 409, description = "Coupon expired or exhausted"),
        (status = 502, description = "Payment provider unreachable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BeginCheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutSessionResponse>>> {
    let resp = checkout_service::begin_checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}
