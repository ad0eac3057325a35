use anyhow::anyhow;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter,
    QuerySelect, Set, SqlErr, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        coupons,
        orders::ActiveModel as OrderActive,
        order_items::ActiveModel as OrderItemActive,
        payment_events::{
            ActiveModel as PaymentEventActive, Column as PaymentEventCol, Entity as PaymentEvents,
        },
    },
    error::{AppError, AppResult},
    models::OrderStatus,
    payments::events::{PaymentEvent, SESSION_COMPLETED},
    services::{checkout_service, notify, stock},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// An order was materialized from the cart snapshot.
    Created { order_id: Uuid },
    /// This session id was already processed; nothing was done.
    Duplicate,
    /// The cart was already empty (redelivery after cart clearing, or the
    /// user emptied it); the event is recorded and nothing else happens.
    EmptyCart,
    /// An event type this handler does not act on.
    Ignored,
}

/// Turn a confirmed payment into durable order and stock state, exactly once
/// per provider session. Everything from the idempotency check through cart
/// clearing runs in one transaction; a failure after money has moved is
/// logged at error level and surfaced as a 500 so the provider retries and
/// operators are alerted.
pub async fn on_payment_confirmed(
    state: &AppState,
    event: PaymentEvent,
) -> AppResult<ReconcileOutcome> {
    if event.event_type != SESSION_COMPLETED {
        tracing::debug!(event_type = %event.event_type, "ignoring payment event");
        return Ok(ReconcileOutcome::Ignored);
    }

    let session = &event.data.object;
    let meta = &session.metadata;

    let txn = state.orm.begin().await?;

    // Redelivery short-circuit: one order per provider session, ever.
    let seen = PaymentEvents::find()
        .filter(PaymentEventCol::SessionId.eq(session.id.as_str()))
        .one(&txn)
        .await?;
    if seen.is_some() {
        tracing::info!(session_id = %session.id, "payment event already processed");
        return Ok(ReconcileOutcome::Duplicate);
    }

    // The live cart is the source of truth for line items, not the stale
    // session payload. Lock the rows so nothing mutates them mid-flight.
    let cart_rows = CartItems::find()
        .filter(CartCol::UserId.eq(meta.user_id))
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if cart_rows.is_empty() {
        let recorded = record_event(&txn, &event, None).await?;
        txn.commit().await?;
        tracing::info!(session_id = %session.id, "cart empty at reconciliation, no-op");
        return Ok(if recorded {
            ReconcileOutcome::EmptyCart
        } else {
            ReconcileOutcome::Duplicate
        });
    }

    let lines = checkout_service::load_cart_lines(&txn, meta.user_id).await?;

    let coupon_id = match meta.coupon_code.as_deref() {
        Some(code) => Some(consume_coupon(&txn, code, &session.id).await?),
        None => None,
    };

    // Items are priced at reservation time; the discount the customer was
    // charged with comes from the session metadata, bounded by the live
    // subtotal so the total can never go negative.
    let subtotal: i64 = lines.iter().map(|l| l.line_total()).sum();
    let discount = meta.discount.clamp(0, subtotal);
    let total = (subtotal - discount).max(0);

    for line in &lines {
        if let Err(err) = stock::reserve(&txn, line.sku(), line.quantity).await {
            match err {
                stock::StockError::Insufficient(sku) => {
                    // Payment is already captured; this needs an operator
                    // (refund or restock), not a silent drop.
                    tracing::error!(
                        session_id = %session.id,
                        user_id = %meta.user_id,
                        %sku,
                        "insufficient stock for a captured payment, manual reconciliation required"
                    );
                    return Err(AppError::Internal(anyhow!(
                        "insufficient stock while reconciling session {}",
                        session.id
                    )));
                }
                other => return Err(other.into()),
            }
        }
    }

    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(meta.user_id),
        subtotal: Set(subtotal),
        discount: Set(discount),
        total_amount: Set(total),
        coupon_id: Set(coupon_id),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_status: Set("paid".into()),
        invoice_number: Set(build_invoice_number(order_id)),
        paid_at: Set(Some(now.into())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for line in &lines {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            variant_id: Set(line.variant_id),
            name: Set(line.name.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    if !record_event(&txn, &event, Some(order.id)).await? {
        // A concurrent delivery of the same session won the unique index.
        txn.rollback().await?;
        tracing::info!(session_id = %session.id, "lost idempotency race, treating as duplicate");
        return Ok(ReconcileOutcome::Duplicate);
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(meta.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        session_id = %session.id,
        total,
        "order materialized from payment confirmation"
    );

    if let Err(err) = log_audit(
        &state.pool,
        Some(meta.user_id),
        "order_created",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "session_id": session.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    notify::order_created(&state.config, &order).await;

    Ok(ReconcileOutcome::Created { order_id: order.id })
}

/// Record the processed event. Returns false when another delivery of the
/// same session id got there first (unique violation).
async fn record_event(
    txn: &DatabaseTransaction,
    event: &PaymentEvent,
    order_id: Option<Uuid>,
) -> AppResult<bool> {
    let insert = PaymentEventActive {
        id: Set(Uuid::new_v4()),
        provider_event_id: Set(event.id.clone()),
        session_id: Set(event.data.object.id.clone()),
        event_type: Set(event.event_type.clone()),
        order_id: Set(order_id),
        received_at: NotSet,
    }
    .insert(txn)
    .await;

    match insert {
        Ok(_) => Ok(true),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Ok(false),
            _ => Err(err.into()),
        },
    }
}

/// Increment the coupon's usage exactly once, guarded in SQL against expiry
/// and the usage limit so concurrent reconciliations cannot overshoot.
async fn consume_coupon(
    txn: &DatabaseTransaction,
    code: &str,
    session_id: &str,
) -> AppResult<Uuid> {
    let coupon = checkout_service::find_coupon(txn, code).await.map_err(|err| {
        if matches!(err, AppError::NotFound) {
            tracing::error!(%code, %session_id, "coupon vanished after payment capture");
            AppError::Internal(anyhow!("coupon {code} missing while reconciling {session_id}"))
        } else {
            err
        }
    })?;

    let affected = coupons::Entity::update_many()
        .col_expr(
            coupons::Column::UsageCount,
            Expr::col(coupons::Column::UsageCount).add(1),
        )
        .filter(coupons::Column::Id.eq(coupon.id))
        .filter(coupons::Column::ExpiresAt.gt(Utc::now()))
        .filter(
            Condition::any()
                .add(coupons::Column::UsageLimit.is_null())
                .add(Expr::col(coupons::Column::UsageCount).lt(Expr::col(coupons::Column::UsageLimit))),
        )
        .exec(txn)
        .await?
        .rows_affected;

    if affected == 0 {
        tracing::error!(
            %code,
            %session_id,
            "coupon no longer usable after payment capture, manual reconciliation required"
        );
        return Err(AppError::Internal(anyhow!(
            "coupon {code} exhausted or expired while reconciling {session_id}"
        )));
    }

    Ok(coupon.id)
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("INV-{}-{}", date, short)
}
