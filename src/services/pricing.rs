use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::coupons::Model as CouponModel;
use crate::error::AppError;
use crate::services::stock::Sku;

pub const DISCOUNT_PERCENT: &str = "percent";
pub const DISCOUNT_FIXED: &str = "fixed";

/// One cart line joined with its catalog price. `unit_price` is the variant
/// price when a variant is set, the product price otherwise.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl PricedLine {
    pub fn sku(&self) -> Sku {
        Sku {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("coupon is expired or exhausted")]
    CouponInvalid,

    #[error("coupon cannot be applied to this cart")]
    CouponNotApplicable,
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::CouponInvalid => AppError::Conflict(err.to_string()),
            PricingError::CouponNotApplicable => AppError::BadRequest(err.to_string()),
        }
    }
}

/// Price a cart snapshot, applying at most one coupon. Pure: no side effects,
/// no usage-count mutation (that happens at reconciliation, so an abandoned
/// checkout never burns a use).
pub fn price(
    lines: &[PricedLine],
    coupon: Option<&CouponModel>,
    now: DateTime<Utc>,
) -> Result<Quote, PricingError> {
    let subtotal: i64 = lines.iter().map(PricedLine::line_total).sum();

    let discount = match coupon {
        None => 0,
        Some(coupon) => {
            if coupon.expires_at.with_timezone(&Utc) <= now {
                return Err(PricingError::CouponInvalid);
            }
            if let Some(limit) = coupon.usage_limit {
                if coupon.usage_count >= limit {
                    return Err(PricingError::CouponInvalid);
                }
            }
            if subtotal == 0 {
                return Err(PricingError::CouponNotApplicable);
            }
            let raw = match coupon.discount_type.as_str() {
                DISCOUNT_PERCENT => subtotal * coupon.amount / 100,
                DISCOUNT_FIXED => coupon.amount,
                _ => return Err(PricingError::CouponNotApplicable),
            };
            raw.clamp(0, subtotal)
        }
    };

    Ok(Quote {
        subtotal,
        discount,
        total: (subtotal - discount).max(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn line(unit_price: i64, quantity: i32) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            variant_id: None,
            name: "Test Widget".into(),
            unit_price,
            quantity,
        }
    }

    fn coupon(discount_type: &str, amount: i64, usage_limit: Option<i32>) -> CouponModel {
        let now = Utc::now();
        CouponModel {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            discount_type: discount_type.into(),
            amount,
            expires_at: (now + Duration::days(1)).into(),
            usage_count: 0,
            usage_limit,
            created_at: now.into(),
        }
    }

    #[test]
    fn subtotal_without_coupon() {
        let quote = price(&[line(1000, 2), line(250, 4)], None, Utc::now()).unwrap();
        assert_eq!(quote.subtotal, 3000);
        assert_eq!(quote.discount, 0);
        assert_eq!(quote.total, 3000);
    }

    #[test]
    fn ten_percent_off_twenty() {
        // cart = [{price 10.00, qty 2}], coupon = 10%
        let c = coupon(DISCOUNT_PERCENT, 10, None);
        let quote = price(&[line(1000, 2)], Some(&c), Utc::now()).unwrap();
        assert_eq!(quote.subtotal, 2000);
        assert_eq!(quote.discount, 200);
        assert_eq!(quote.total, 1800);
    }

    #[test]
    fn fixed_discount_clamped_to_subtotal() {
        let c = coupon(DISCOUNT_FIXED, 5000, None);
        let quote = price(&[line(1000, 2)], Some(&c), Utc::now()).unwrap();
        assert_eq!(quote.discount, 2000);
        assert_eq!(quote.total, 0);
    }

    #[test]
    fn expired_coupon_rejected() {
        let mut c = coupon(DISCOUNT_PERCENT, 10, None);
        c.expires_at = (Utc::now() - Duration::hours(1)).into();
        let err = price(&[line(1000, 1)], Some(&c), Utc::now()).unwrap_err();
        assert_eq!(err, PricingError::CouponInvalid);
    }

    #[test]
    fn exhausted_coupon_rejected() {
        let mut c = coupon(DISCOUNT_FIXED, 100, Some(1));
        c.usage_count = 1;
        let err = price(&[line(1000, 1)], Some(&c), Utc::now()).unwrap_err();
        assert_eq!(err, PricingError::CouponInvalid);
    }

    #[test]
    fn coupon_on_empty_cart_not_applicable() {
        let c = coupon(DISCOUNT_PERCENT, 10, None);
        let err = price(&[], Some(&c), Utc::now()).unwrap_err();
        assert_eq!(err, PricingError::CouponNotApplicable);
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let c = coupon(DISCOUNT_PERCENT, 150, None);
        let quote = price(&[line(1000, 1)], Some(&c), Utc::now()).unwrap();
        assert_eq!(quote.discount, 1000);
        assert_eq!(quote.total, 0);
    }
}
