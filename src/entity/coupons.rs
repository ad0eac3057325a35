use sea_orm::entity::prelude::*;

/// `amount` is percentage points for `discount_type = "percent"` and minor
/// currency units for `discount_type = "fixed"`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub amount: i64,
    pub expires_at: DateTimeWithTimeZone,
    pub usage_count: i32,
    pub usage_limit: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
