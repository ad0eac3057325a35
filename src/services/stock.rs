use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{product_variants, products};
use crate::error::AppError;

/// A stock-keeping unit: a product, or a specific product+variant, each with
/// its own quantity counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sku {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum StockError {
    #[error("insufficient stock for {0}")]
    Insufficient(Uuid),

    #[error("unknown sku {0}")]
    UnknownSku(Uuid),

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Insufficient(_) => AppError::Conflict(err.to_string()),
            StockError::UnknownSku(_) => AppError::NotFound,
            StockError::Db(e) => AppError::OrmError(e),
        }
    }
}

/// Atomically decrement a SKU's quantity. The check and the decrement are a
/// single guarded UPDATE (`stock = stock - qty WHERE stock >= qty`), so two
/// concurrent reservations can never both drain the same units or drive the
/// counter negative.
pub async fn reserve<C: ConnectionTrait>(conn: &C, sku: Sku, qty: i32) -> Result<(), StockError> {
    let affected = match sku.variant_id {
        Some(variant_id) => {
            product_variants::Entity::update_many()
                .col_expr(
                    product_variants::Column::Stock,
                    Expr::col(product_variants::Column::Stock).sub(qty),
                )
                .filter(product_variants::Column::Id.eq(variant_id))
                .filter(product_variants::Column::Stock.gte(qty))
                .exec(conn)
                .await?
                .rows_affected
        }
        None => {
            products::Entity::update_many()
                .col_expr(
                    products::Column::Stock,
                    Expr::col(products::Column::Stock).sub(qty),
                )
                .filter(products::Column::Id.eq(sku.product_id))
                .filter(products::Column::Stock.gte(qty))
                .exec(conn)
                .await?
                .rows_affected
        }
    };

    if affected == 0 {
        return Err(StockError::Insufficient(
            sku.variant_id.unwrap_or(sku.product_id),
        ));
    }
    Ok(())
}

/// Increment a SKU's quantity. Callers must source `qty` from the order's own
/// item rows inside the cancelling transaction, so a release can never exceed
/// what that order reserved.
pub async fn release<C: ConnectionTrait>(conn: &C, sku: Sku, qty: i32) -> Result<(), StockError> {
    let affected = match sku.variant_id {
        Some(variant_id) => {
            product_variants::Entity::update_many()
                .col_expr(
                    product_variants::Column::Stock,
                    Expr::col(product_variants::Column::Stock).add(qty),
                )
                .filter(product_variants::Column::Id.eq(variant_id))
                .exec(conn)
                .await?
                .rows_affected
        }
        None => {
            products::Entity::update_many()
                .col_expr(
                    products::Column::Stock,
                    Expr::col(products::Column::Stock).add(qty),
                )
                .filter(products::Column::Id.eq(sku.product_id))
                .exec(conn)
                .await?
                .rows_affected
        }
    };

    if affected == 0 {
        return Err(StockError::UnknownSku(
            sku.variant_id.unwrap_or(sku.product_id),
        ));
    }
    Ok(())
}
