use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{OrderStatus, PaymentMethod, PaymentStatus},
    services::order_status::{OrderStatusUpdate, OrderStatusUpdateService},
};

pub const SWEEP_NOTE: &str = "Card payment was not completed in time.";

/// Cancels card orders whose charge never succeeded.
#[derive(Clone)]
pub struct UnpaidOrderReconciler {
    db: Arc<DatabaseConnection>,
    status: Arc<OrderStatusUpdateService>,
    event_sender: EventSender,
    stale_after: chrono::Duration,
}

impl UnpaidOrderReconciler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        status: Arc<OrderStatusUpdateService>,
        event_sender: EventSender,
        stale_after_minutes: i64,
    ) -> Self {
        Self {
            db,
            status,
            event_sender,
            stale_after: chrono::Duration::minutes(stale_after_minutes),
        }
    }

    /// Fails the payment and cancels the order (restocking it) for every card
    /// order still unpaid and created before `now - stale_after`. Orders that
    /// carry a captured charge reference are skipped.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        let cutoff = now - self.stale_after;
        let stale: Vec<Uuid> = OrderEntity::find()
            .select_only()
            .column(order::Column::Id)
            .filter(order::Column::PaymentMethod.eq(PaymentMethod::Card))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::ChargeId.is_null())
            .filter(order::Column::OrderStatus.ne(OrderStatus::Cancelled))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .order_by_asc(order::Column::CreatedAt)
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut swept = Vec::with_capacity(stale.len());
        for order_id in stale {
            let update = OrderStatusUpdate {
                order_status: Some(OrderStatus::Cancelled),
                payment_status: Some(PaymentStatus::Failed),
                admin_notes: Some(SWEEP_NOTE.to_string()),
                ..Default::default()
            };
            match self.status.apply(order_id, update).await {
                Ok(_) => swept.push(order_id),
                // One stuck order must not block the rest of the sweep.
                Err(e) => warn!(%order_id, error = %e, "could not sweep unpaid order"),
            }
        }

        if !swept.is_empty() {
            metrics::UNPAID_ORDERS_SWEPT.inc_by(swept.len() as u64);
            self.event_sender.publish(Event::UnpaidOrdersSwept {
                count: swept.len(),
                at: now,
            });
            info!(count = swept.len(), "stale unpaid card orders cancelled");
        }
        Ok(swept)
    }

    /// Runs [`sweep`](Self::sweep) every `interval` until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep(Utc::now()).await {
                    error!(error = %e, "unpaid order sweep failed");
                }
            }
        })
    }
}
