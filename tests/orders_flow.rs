use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, Statement};
use tokio::sync::Mutex;
use uuid::Uuid;

use storefront_api::{
    config::{AppConfig, PaymentConfig},
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::AddToCartRequest,
    dto::orders::UpdateOrderStatusRequest,
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        coupons::{ActiveModel as CouponActive, Entity as Coupons},
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Entity as Products},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::OrderStatus,
    payments::client::PaymentClient,
    payments::events::{
        CheckoutSessionObject, PaymentEvent, PaymentEventData, SESSION_COMPLETED, SessionMetadata,
    },
    services::{admin_service, cart_service, checkout_service, order_service, reconciliation_service},
    services::reconciliation_service::ReconcileOutcome,
    state::AppState,
};

// Integration flows for the order/inventory core. These hit a real Postgres
// and are skipped when no database is configured in the environment.
//
// setup_state truncates every table, so the tests share one lock and run
// strictly one at a time even under the parallel test harness.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    let pool = create_pool(&database_url).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE payment_events, order_items, orders, cart_items, coupons, product_variants, products, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    let payments = PaymentConfig {
        api_base: "http://localhost:0".into(),
        secret_key: "sk_test".into(),
        webhook_secret: "whsec_test".into(),
        webhook_tolerance_secs: 300,
        success_url: "http://localhost/success".into(),
        cancel_url: "http://localhost/cancel".into(),
    };
    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        payments: payments.clone(),
        notify_webhook_url: None,
    };

    Ok(Some(AppState {
        pool,
        orm,
        payments: PaymentClient::new(payments),
        config,
    }))
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: role.into(),
    })
}

async fn create_product(state: &AppState, name: &str, price: i64, stock: i32) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    Ok(Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists")
        .stock)
}

async fn order_count(state: &AppState, user_id: Uuid) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::UserId.eq(user_id))
        .count(&state.orm)
        .await?)
}

fn session_event(session_id: &str, meta: SessionMetadata) -> PaymentEvent {
    PaymentEvent {
        id: format!("evt_{session_id}"),
        event_type: SESSION_COMPLETED.into(),
        data: PaymentEventData {
            object: CheckoutSessionObject {
                id: session_id.into(),
                payment_status: Some("paid".into()),
                metadata: meta,
            },
        },
    }
}

#[tokio::test]
async fn checkout_reconcile_and_redelivery_flow() -> anyhow::Result<()> {
    let _db = DB_LOCK.lock().await;
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user", "user@example.com").await?;
    let product_id = create_product(&state, "Test Widget", 1000, 10).await?;

    let coupon = CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set("TEN".into()),
        discount_type: Set("percent".into()),
        amount: Set(10),
        expires_at: Set((Utc::now() + Duration::days(1)).into()),
        usage_count: Set(0),
        usage_limit: Set(Some(5)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    cart_service::add_to_cart(
        &state,
        &user,
        AddToCartRequest {
            product_id,
            variant_id: None,
            quantity: 2,
        },
    )
    .await?;

    // Quoting is side-effect free: cart 2 x 10.00 with 10% off.
    let (_, _, quote) = checkout_service::quote(&state.orm, user.user_id, Some("TEN")).await?;
    assert_eq!(quote.subtotal, 2000);
    assert_eq!(quote.discount, 200);
    assert_eq!(quote.total, 1800);
    assert_eq!(product_stock(&state, product_id).await?, 10);

    let event = session_event(
        "cs_100",
        SessionMetadata {
            user_id: user.user_id,
            coupon_code: Some("TEN".into()),
            discount: quote.discount,
            total: quote.total,
        },
    );

    let outcome = reconciliation_service::on_payment_confirmed(&state, event.clone()).await?;
    let ReconcileOutcome::Created { order_id } = outcome else {
        panic!("expected an order, got {outcome:?}");
    };

    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .expect("order persisted");
    assert_eq!(order.subtotal, 2000);
    assert_eq!(order.discount, 200);
    assert_eq!(order.total_amount, 1800);
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_status, "paid");
    assert!(order.paid_at.is_some());
    assert_eq!(order.coupon_id, Some(coupon.id));

    // Stock reserved, coupon consumed, cart cleared.
    assert_eq!(product_stock(&state, product_id).await?, 8);
    let coupon = Coupons::find_by_id(coupon.id)
        .one(&state.orm)
        .await?
        .expect("coupon exists");
    assert_eq!(coupon.usage_count, 1);
    let cart_count = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(cart_count, 0);

    // Redelivery of the same session is an idempotent no-op.
    let outcome = reconciliation_service::on_payment_confirmed(&state, event).await?;
    assert_eq!(outcome, ReconcileOutcome::Duplicate);
    assert_eq!(order_count(&state, user.user_id).await?, 1);
    assert_eq!(product_stock(&state, product_id).await?, 8);

    Ok(())
}

#[tokio::test]
async fn cancel_restores_stock_exactly_once() -> anyhow::Result<()> {
    let _db = DB_LOCK.lock().await;
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user", "cancel@example.com").await?;
    let product_id = create_product(&state, "Cancellable", 500, 10).await?;

    cart_service::add_to_cart(
        &state,
        &user,
        AddToCartRequest {
            product_id,
            variant_id: None,
            quantity: 3,
        },
    )
    .await?;

    let event = session_event(
        "cs_cancel",
        SessionMetadata {
            user_id: user.user_id,
            coupon_code: None,
            discount: 0,
            total: 1500,
        },
    );
    let ReconcileOutcome::Created { order_id } =
        reconciliation_service::on_payment_confirmed(&state, event).await?
    else {
        panic!("expected an order");
    };
    assert_eq!(product_stock(&state, product_id).await?, 7);

    let resp = order_service::cancel_order(&state, &user, order_id).await?;
    let cancelled = resp.data.expect("cancel response").order;
    assert_eq!(cancelled.status, OrderStatus::Cancelled.as_str());
    assert_eq!(product_stock(&state, product_id).await?, 10);

    // A second cancel conflicts instead of double-releasing.
    let err = order_service::cancel_order(&state, &user, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
    assert_eq!(product_stock(&state, product_id).await?, 10);

    // A different user cannot cancel someone else's order.
    let stranger = create_user(&state, "user", "stranger@example.com").await?;
    let err = order_service::cancel_order(&state, &stranger, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn concurrent_checkouts_cannot_oversell() -> anyhow::Result<()> {
    let _db = DB_LOCK.lock().await;
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let alice = create_user(&state, "user", "alice@example.com").await?;
    let bob = create_user(&state, "user", "bob@example.com").await?;
    let product_id = create_product(&state, "Last One", 2500, 1).await?;

    for user in [&alice, &bob] {
        cart_service::add_to_cart(
            &state,
            user,
            AddToCartRequest {
                product_id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await?;
    }

    let event_a = session_event(
        "cs_alice",
        SessionMetadata {
            user_id: alice.user_id,
            coupon_code: None,
            discount: 0,
            total: 2500,
        },
    );
    let event_b = session_event(
        "cs_bob",
        SessionMetadata {
            user_id: bob.user_id,
            coupon_code: None,
            discount: 0,
            total: 2500,
        },
    );

    let state_a = state.clone();
    let state_b = state.clone();
    let (res_a, res_b) = tokio::join!(
        tokio::spawn(async move {
            reconciliation_service::on_payment_confirmed(&state_a, event_a).await
        }),
        tokio::spawn(async move {
            reconciliation_service::on_payment_confirmed(&state_b, event_b).await
        }),
    );

    let results = [res_a?, res_b?];
    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(ReconcileOutcome::Created { .. })))
        .count();
    let failed = results.iter().filter(|r| r.is_err()).count();

    assert_eq!(created, 1, "exactly one checkout wins the last unit");
    assert_eq!(failed, 1, "the loser surfaces a processing error");
    let total_orders =
        order_count(&state, alice.user_id).await? + order_count(&state, bob.user_id).await?;
    assert_eq!(total_orders, 1);
    assert_eq!(product_stock(&state, product_id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn limited_coupon_consumed_by_exactly_one_concurrent_checkout() -> anyhow::Result<()> {
    let _db = DB_LOCK.lock().await;
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let alice = create_user(&state, "user", "coupon-a@example.com").await?;
    let bob = create_user(&state, "user", "coupon-b@example.com").await?;
    let product_id = create_product(&state, "Couponable", 1000, 10).await?;

    let coupon = CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set("ONCE".into()),
        discount_type: Set("fixed".into()),
        amount: Set(100),
        expires_at: Set((Utc::now() + Duration::days(1)).into()),
        usage_count: Set(0),
        usage_limit: Set(Some(1)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    for user in [&alice, &bob] {
        cart_service::add_to_cart(
            &state,
            user,
            AddToCartRequest {
                product_id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await?;
    }

    let event_a = session_event(
        "cs_once_a",
        SessionMetadata {
            user_id: alice.user_id,
            coupon_code: Some("ONCE".into()),
            discount: 100,
            total: 900,
        },
    );
    let event_b = session_event(
        "cs_once_b",
        SessionMetadata {
            user_id: bob.user_id,
            coupon_code: Some("ONCE".into()),
            discount: 100,
            total: 900,
        },
    );

    let state_a = state.clone();
    let state_b = state.clone();
    let (res_a, res_b) = tokio::join!(
        tokio::spawn(async move {
            reconciliation_service::on_payment_confirmed(&state_a, event_a).await
        }),
        tokio::spawn(async move {
            reconciliation_service::on_payment_confirmed(&state_b, event_b).await
        }),
    );

    let results = [res_a?, res_b?];
    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(ReconcileOutcome::Created { .. })))
        .count();
    let failed = results.iter().filter(|r| r.is_err()).count();

    assert_eq!(created, 1, "exactly one checkout burns the last coupon use");
    assert_eq!(failed, 1, "the loser surfaces a processing error");

    // The guarded increment stops at the limit even under concurrency.
    let coupon = Coupons::find_by_id(coupon.id)
        .one(&state.orm)
        .await?
        .expect("coupon exists");
    assert_eq!(coupon.usage_count, 1);
    let total_orders =
        order_count(&state, alice.user_id).await? + order_count(&state, bob.user_id).await?;
    assert_eq!(total_orders, 1);

    Ok(())
}

#[tokio::test]
async fn admin_status_updates_respect_state_machine() -> anyhow::Result<()> {
    let _db = DB_LOCK.lock().await;
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user", "flow@example.com").await?;
    let admin = create_user(&state, "admin", "admin@example.com").await?;
    let product_id = create_product(&state, "Shippable", 900, 4).await?;

    cart_service::add_to_cart(
        &state,
        &user,
        AddToCartRequest {
            product_id,
            variant_id: None,
            quantity: 1,
        },
    )
    .await?;

    let ReconcileOutcome::Created { order_id } = reconciliation_service::on_payment_confirmed(
        &state,
        session_event(
            "cs_ship",
            SessionMetadata {
                user_id: user.user_id,
                coupon_code: None,
                discount: 0,
                total: 900,
            },
        ),
    )
    .await?
    else {
        panic!("expected an order");
    };

    // pending -> paid -> shipped -> delivered
    for status in ["paid", "shipped", "delivered"] {
        let resp = admin_service::update_order_status(
            &state,
            &admin,
            order_id,
            UpdateOrderStatusRequest {
                status: status.into(),
            },
        )
        .await?;
        assert_eq!(resp.data.expect("order").status, status);
    }

    // Terminal state is final.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        order_id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

    // Cancellation is not reachable through the status setter.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        order_id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

    // Non-admins are rejected outright.
    let err = admin_service::update_order_status(
        &state,
        &user,
        order_id,
        UpdateOrderStatusRequest {
            status: "paid".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn empty_cart_reconciliation_is_a_noop() -> anyhow::Result<()> {
    let _db = DB_LOCK.lock().await;
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user", "empty@example.com").await?;

    let outcome = reconciliation_service::on_payment_confirmed(
        &state,
        session_event(
            "cs_empty",
            SessionMetadata {
                user_id: user.user_id,
                coupon_code: None,
                discount: 0,
                total: 0,
            },
        ),
    )
    .await?;
    assert_eq!(outcome, ReconcileOutcome::EmptyCart);
    assert_eq!(order_count(&state, user.user_id).await?, 0);

    Ok(())
}
