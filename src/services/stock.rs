use std::collections::BTreeMap;
use std::sync::Arc;

use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Select,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::stock_level::{self, Entity as StockLevel},
    errors::ServiceError,
    models::CartLine,
};

/// Quantity wanted for one product or variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

impl From<&CartLine> for StockRequest {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            variant_id: line.variant_id,
            quantity: line.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnavailableItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub requested: i32,
    pub available: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", content = "items", rename_all = "snake_case")]
pub enum StockCheck {
    Available,
    Unavailable(Vec<UnavailableItem>),
}

impl StockCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, StockCheck::Available)
    }

    /// Converts an unavailable result into the retryable checkout error.
    pub fn into_result(self) -> Result<(), ServiceError> {
        match self {
            StockCheck::Available => Ok(()),
            StockCheck::Unavailable(items) => Err(ServiceError::StockUnavailable(items)),
        }
    }
}

/// Sums quantities of lines pointing at the same product/variant.
pub fn merge_requests(items: &[StockRequest]) -> BTreeMap<(Uuid, Option<Uuid>), i32> {
    let mut merged = BTreeMap::new();
    for item in items {
        let total = merged.entry((item.product_id, item.variant_id)).or_insert(0i32);
        *total = total.saturating_add(item.quantity);
    }
    merged
}

fn stock_row(product_id: Uuid, variant_id: Option<Uuid>) -> Select<StockLevel> {
    let query = StockLevel::find().filter(stock_level::Column::ProductId.eq(product_id));
    match variant_id {
        Some(variant_id) => query.filter(stock_level::Column::VariantId.eq(variant_id)),
        None => query.filter(stock_level::Column::VariantId.is_null()),
    }
}

/// Point-in-time availability check. Advisory only: nothing is reserved.
#[derive(Clone)]
pub struct StockReservationGuard {
    db: Arc<DatabaseConnection>,
}

impl StockReservationGuard {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn check(&self, items: &[StockRequest]) -> Result<StockCheck, ServiceError> {
        check_on(&*self.db, items).await
    }
}

/// Availability check against any connection, including an open transaction.
pub async fn check_on<C: ConnectionTrait>(
    conn: &C,
    items: &[StockRequest],
) -> Result<StockCheck, ServiceError> {
    let mut unavailable = Vec::new();

    for ((product_id, variant_id), requested) in merge_requests(items) {
        let available = stock_row(product_id, variant_id)
            .one(conn)
            .await?
            .map(|row| row.available)
            .unwrap_or(0);

        if available < requested {
            unavailable.push(UnavailableItem {
                product_id,
                variant_id,
                requested,
                available: available.max(0),
            });
        }
    }

    if unavailable.is_empty() {
        debug!("all requested items are in stock");
        Ok(StockCheck::Available)
    } else {
        warn!(count = unavailable.len(), "items out of stock");
        Ok(StockCheck::Unavailable(unavailable))
    }
}

/// Decrements stock for every request, failing if any row lacks the quantity.
/// Meant to run inside the order-insert transaction so a failure rolls back
/// the order with it.
pub async fn decrement_on<C: ConnectionTrait>(
    conn: &C,
    items: &[StockRequest],
) -> Result<(), ServiceError> {
    let mut short = Vec::new();

    for ((product_id, variant_id), quantity) in merge_requests(items) {
        let mut update = StockLevel::update_many()
            .col_expr(
                stock_level::Column::Available,
                Expr::col(stock_level::Column::Available).sub(quantity),
            )
            .col_expr(
                stock_level::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(stock_level::Column::ProductId.eq(product_id))
            .filter(stock_level::Column::Available.gte(quantity));
        update = match variant_id {
            Some(variant_id) => update.filter(stock_level::Column::VariantId.eq(variant_id)),
            None => update.filter(stock_level::Column::VariantId.is_null()),
        };

        let result = update.exec(conn).await?;
        if result.rows_affected == 0 {
            let available = stock_row(product_id, variant_id)
                .one(conn)
                .await?
                .map(|row| row.available)
                .unwrap_or(0);
            short.push(UnavailableItem {
                product_id,
                variant_id,
                requested: quantity,
                available: available.max(0),
            });
        }
    }

    if short.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::StockUnavailable(short))
    }
}

/// Returns units to stock, e.g. when an order is cancelled.
pub async fn restock_on<C: ConnectionTrait>(
    conn: &C,
    items: &[StockRequest],
) -> Result<(), ServiceError> {
    for ((product_id, variant_id), quantity) in merge_requests(items) {
        let mut update = StockLevel::update_many()
            .col_expr(
                stock_level::Column::Available,
                Expr::col(stock_level::Column::Available).add(quantity),
            )
            .col_expr(
                stock_level::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(stock_level::Column::ProductId.eq(product_id));
        update = match variant_id {
            Some(variant_id) => update.filter(stock_level::Column::VariantId.eq(variant_id)),
            None => update.filter(stock_level::Column::VariantId.is_null()),
        };
        if update.exec(conn).await?.rows_affected == 0 {
            warn!(%product_id, ?variant_id, "no stock row to return units to");
        }
    }
    Ok(())
}
