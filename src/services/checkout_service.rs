use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, JoinType, QueryFilter, QuerySelect,
    RelationTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::checkout::{BeginCheckoutRequest, CheckoutSessionResponse},
    entity::{
        cart_items,
        coupons::{Column as CouponCol, Entity as Coupons, Model as CouponModel},
        product_variants, products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    payments::{client::SessionLineItem, events::SessionMetadata},
    response::{ApiResponse, Meta},
    services::pricing::{self, PricedLine, Quote},
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct CartLineRow {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    name: String,
    product_price: i64,
    variant_name: Option<String>,
    variant_price: Option<i64>,
}

/// Load the user's cart joined with catalog prices. Prices always come from
/// the catalog rows, never from anything the client sent.
pub(crate) async fn load_cart_lines<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<Vec<PricedLine>> {
    let rows = cart_items::Entity::find()
        .select_only()
        .column_as(cart_items::Column::ProductId, "product_id")
        .column_as(cart_items::Column::VariantId, "variant_id")
        .column_as(cart_items::Column::Quantity, "quantity")
        .column_as(products::Column::Name, "name")
        .column_as(products::Column::Price, "product_price")
        .column_as(product_variants::Column::Name, "variant_name")
        .column_as(product_variants::Column::Price, "variant_price")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .join(
            JoinType::LeftJoin,
            cart_items::Relation::ProductVariants.def(),
        )
        .filter(cart_items::Column::UserId.eq(user_id))
        .into_model::<CartLineRow>()
        .all(conn)
        .await?;

    let lines = rows
        .into_iter()
        .map(|row| {
            let name = match &row.variant_name {
                Some(variant) => format!("{} ({variant})", row.name),
                None => row.name.clone(),
            };
            PricedLine {
                product_id: row.product_id,
                variant_id: row.variant_id,
                name,
                unit_price: row.variant_price.unwrap_or(row.product_price),
                quantity: row.quantity,
            }
        })
        .collect();

    Ok(lines)
}

pub(crate) async fn find_coupon<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> AppResult<CouponModel> {
    Coupons::find()
        .filter(CouponCol::Code.eq(code))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

/// Price the current cart, validating the coupon but mutating nothing.
pub async fn quote<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    coupon_code: Option<&str>,
) -> AppResult<(Vec<PricedLine>, Option<CouponModel>, Quote)> {
    let lines = load_cart_lines(conn, user_id).await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let coupon = match coupon_code {
        Some(code) => Some(find_coupon(conn, code).await?),
        None => None,
    };

    let quote = pricing::price(&lines, coupon.as_ref(), Utc::now())?;
    Ok((lines, coupon, quote))
}

/// Begin a checkout: price the cart and open a payment session with the
/// provider. Creates no order and touches no stock; an abandoned session
/// leaves nothing behind.
pub async fn begin_checkout(
    state: &AppState,
    user: &AuthUser,
    payload: BeginCheckoutRequest,
) -> AppResult<ApiResponse<CheckoutSessionResponse>> {
    let coupon_code = payload
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let (lines, _coupon, quote) = quote(&state.orm, user.user_id, coupon_code).await?;

    let line_items: Vec<SessionLineItem> = lines
        .iter()
        .map(|line| SessionLineItem {
            name: line.name.clone(),
            description: None,
            unit_amount: line.unit_price,
            quantity: line.quantity,
        })
        .collect();

    let metadata = SessionMetadata {
        user_id: user.user_id,
        coupon_code: coupon_code.map(str::to_owned),
        discount: quote.discount,
        total: quote.total,
    };

    let session = state.payments.create_session(&line_items, &metadata).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout_session_created",
        Some("orders"),
        Some(serde_json::json!({ "session_id": session.id, "total": quote.total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(
        user_id = %user.user_id,
        session_id = %session.id,
        total = quote.total,
        "payment session created"
    );

    Ok(ApiResponse::success(
        "Checkout session created",
        CheckoutSessionResponse {
            session_id: session.id,
            url: session.url,
            subtotal: quote.subtotal,
            discount: quote.discount,
            total: quote.total,
        },
        Some(Meta::empty()),
    ))
}
