use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order entity: an immutable snapshot of a cart plus shipping and payment
/// metadata. Only the status fields (and their timestamps) change after
/// creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub payment_method: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_price: Decimal,
    pub status: OrderStatus,
    #[sea_orm(nullable)]
    pub paid_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub payment_status: Option<String>,
    #[sea_orm(nullable)]
    pub payment_update_time: Option<String>,
    #[sea_orm(nullable)]
    pub payer_email: Option<String>,
    #[sea_orm(nullable)]
    pub delivered_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order payment/fulfillment lifecycle.
///
/// A single enum instead of independent paid/delivered booleans, so an order
/// that is delivered but never paid cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

impl OrderStatus {
    pub fn is_paid(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Delivered)
    }

    pub fn is_delivered(self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Legal forward transitions; re-applying the current status is treated
    /// as an idempotent no-op by callers, not as a transition.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Created, OrderStatus::Paid) | (OrderStatus::Paid, OrderStatus::Delivered)
        )
    }
}
