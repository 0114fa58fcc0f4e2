use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FulfillmentStatus, OrderStatus, PaymentMethod, PaymentStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,

    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_method: PaymentMethod,

    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,

    // Customer snapshot
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_dni: Option<String>,

    // Address snapshot
    pub address_line: String,
    pub district_code: String,
    pub address_reference: Option<String>,

    // Shipping snapshot
    pub shipping_rate_id: String,
    pub shipping_carrier: Option<String>,
    pub shipping_estimated_days: Option<String>,

    pub coupon_code: Option<String>,

    pub admin_notes: Option<String>,
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    /// Gateway charge reference; set once a card charge is captured.
    pub charge_id: Option<String>,

    #[serde(skip_serializing)]
    #[sea_orm(unique)]
    pub view_token: String,
    #[serde(skip_serializing)]
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_one = "super::pending_payment::Entity")]
    PendingPayment,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::pending_payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PendingPayment.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            self.updated_at = sea_orm::ActiveValue::Set(Utc::now());
        }
        Ok(self)
    }
}

impl Model {
    /// `total == subtotal + shipping_cost - discount`.
    pub fn totals_balance(&self) -> bool {
        self.total == self.subtotal + self.shipping_cost - self.discount
    }

    /// `paid_at` is set exactly when the payment axis is `paid`.
    pub fn paid_at_consistent(&self) -> bool {
        self.paid_at.is_some() == (self.payment_status == PaymentStatus::Paid)
    }
}
