use chrono::DateTime;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(FromRow)]
struct CartWithProductRow {
    cart_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    variant_name: Option<String>,
    variant_price: Option<i64>,
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
    created_at: DateTime<chrono::Utc>,
}

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithProductRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity, ci.variant_id,
               v.name AS variant_name, v.price AS variant_price,
               p.id AS product_id, p.name, p.description, p.price, p.stock, p.created_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        LEFT JOIN product_variants v ON v.id = ci.variant_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(&state.pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.cart_id,
            unit_price: row.variant_price.unwrap_or(row.price),
            product: Product {
                id: row.product_id,
                name: row.name,
                description: row.description,
                price: row.price,
                stock: row.stock,
                created_at: row.created_at,
            },
            variant_id: row.variant_id,
            variant_name: row.variant_name,
            quantity: row.quantity,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product_exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(&state.pool)
        .await?;
    if product_exist.is_none() {
        return Err(AppError::BadRequest("product not found".to_string()));
    }

    if let Some(variant_id) = payload.variant_id {
        let variant_exist: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM product_variants WHERE id = $1 AND product_id = $2",
        )
        .bind(variant_id)
        .bind(payload.product_id)
        .fetch_optional(&state.pool)
        .await?;
        if variant_exist.is_none() {
            return Err(AppError::BadRequest("variant not found".to_string()));
        }
    }

    let exist: Option<CartItem> = sqlx::query_as(
        r#"
        SELECT * FROM cart_items
        WHERE user_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3
        "#,
    )
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(payload.variant_id)
    .fetch_optional(&state.pool)
    .await?;

    let cart_item = if let Some(item) = exist {
        sqlx::query_as::<_, CartItem>(
            r#"
            UPDATE cart_items
            SET quantity = $3
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(user.user_id)
        .bind(payload.quantity)
        .fetch_one(&state.pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            INSERT INTO cart_items (user_id, product_id, variant_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user.user_id)
        .bind(payload.product_id)
        .bind(payload.variant_id)
        .bind(payload.quantity)
        .fetch_one(&state.pool)
        .await?
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({
            "product_id": payload.product_id,
            "variant_id": payload.variant_id,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items
        WHERE product_id = $1 AND user_id = $2 AND variant_id IS NOT DISTINCT FROM $3
        "#,
    )
    .bind(product_id)
    .bind(user.user_id)
    .bind(variant_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "variant_id": variant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
