use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{FulfillmentStatus, OrderStatus, PaymentStatus, StatusLabel},
    notifications::{EmailKind, EmailNotification, EmailOutbox},
    services::{
        state_machine::{self, Axis, NamedAction, OrderAxes, RequestedAxes, TransitionPlan},
        stock::{self, StockRequest},
    },
};

/// Admin update. Absent fields are left alone; every present axis is validated
/// before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
pub struct OrderStatusUpdate {
    #[serde(default)]
    pub order_status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub courier: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
}

impl OrderStatusUpdate {
    fn requested(&self) -> RequestedAxes {
        RequestedAxes {
            order: self.order_status,
            payment: self.payment_status,
            fulfillment: self.fulfillment_status,
        }
    }
}

/// Non-status fields written alongside a transition.
#[derive(Debug, Clone, Default)]
struct Annotations {
    tracking_number: Option<String>,
    courier: Option<String>,
    admin_notes: Option<String>,
    charge_id: Option<String>,
}

impl Annotations {
    fn is_empty(&self) -> bool {
        self.tracking_number.is_none()
            && self.courier.is_none()
            && self.admin_notes.is_none()
            && self.charge_id.is_none()
    }
}

impl From<OrderStatusUpdate> for Annotations {
    fn from(update: OrderStatusUpdate) -> Self {
        Self {
            tracking_number: trimmed(update.tracking_number),
            courier: trimmed(update.courier),
            admin_notes: trimmed(update.admin_notes),
            charge_id: None,
        }
    }
}

/// A transition written inside a transaction that has not run its
/// post-commit side effects yet. Hand it to
/// [`OrderStatusUpdateService::finish`] once the transaction commits.
#[derive(Debug)]
#[must_use]
pub struct PendingTransition {
    order: OrderModel,
    plan: TransitionPlan,
    annotations: Annotations,
}

impl PendingTransition {
    pub fn order(&self) -> &OrderModel {
        &self.order
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Emails owed for a set of applied transitions, one per distinct kind.
pub fn emails_for(plan: &TransitionPlan) -> Vec<EmailKind> {
    let mut kinds = Vec::new();
    if let Some((_, to)) = plan.order {
        kinds.push(match to {
            OrderStatus::Pending => None,
            OrderStatus::Confirmed => Some(EmailKind::OrderConfirmed),
            OrderStatus::Preparing => Some(EmailKind::OrderPreparing),
            OrderStatus::Shipped => Some(EmailKind::OrderShipped),
            OrderStatus::Delivered => Some(EmailKind::OrderDelivered),
            OrderStatus::Cancelled => Some(EmailKind::OrderCancelled),
        });
    }
    if let Some((_, to)) = plan.payment {
        kinds.push(match to {
            PaymentStatus::Pending => None,
            PaymentStatus::Paid => Some(EmailKind::PaymentConfirmed),
            PaymentStatus::Refunded => Some(EmailKind::PaymentRefunded),
            PaymentStatus::Failed => Some(EmailKind::PaymentFailed),
        });
    }
    if let Some((_, to)) = plan.fulfillment {
        kinds.push(match to {
            FulfillmentStatus::Unfulfilled | FulfillmentStatus::Processing => None,
            FulfillmentStatus::Shipped => Some(EmailKind::OrderShipped),
            FulfillmentStatus::Delivered => Some(EmailKind::OrderDelivered),
        });
    }

    let mut out: Vec<EmailKind> = Vec::new();
    for kind in kinds.into_iter().flatten() {
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    out
}

fn axes_of(order: &OrderModel) -> OrderAxes {
    OrderAxes {
        order: order.order_status,
        payment: order.payment_status,
        fulfillment: order.fulfillment_status,
    }
}

/// Single entry point for every admin-driven change to an order.
#[derive(Clone)]
pub struct OrderStatusUpdateService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    outbox: EmailOutbox,
}

impl OrderStatusUpdateService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        outbox: EmailOutbox,
    ) -> Self {
        Self {
            db,
            event_sender,
            outbox,
        }
    }

    /// Applies any combination of axis changes plus tracking and notes.
    #[instrument(skip(self, update), fields(order_id = %order_id))]
    pub async fn apply(
        &self,
        order_id: Uuid,
        update: OrderStatusUpdate,
    ) -> Result<OrderModel, ServiceError> {
        update.validate()?;
        let requested = update.requested();
        self.execute(
            order_id,
            |axes| state_machine::plan(axes, requested),
            update.into(),
        )
        .await
    }

    /// Same as [`apply`](Self::apply) but writes inside the caller's
    /// transaction. Events, metrics and emails wait for [`finish`](Self::finish).
    pub async fn apply_in(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        update: OrderStatusUpdate,
    ) -> Result<PendingTransition, ServiceError> {
        update.validate()?;
        let requested = update.requested();
        self.write_in(
            txn,
            order_id,
            |axes| state_machine::plan(axes, requested),
            update.into(),
        )
        .await
    }

    /// Marks a card order paid and stores the gateway's charge reference in
    /// the same write.
    #[instrument(skip(self, charge_id), fields(order_id = %order_id))]
    pub async fn record_card_capture(
        &self,
        order_id: Uuid,
        charge_id: String,
    ) -> Result<OrderModel, ServiceError> {
        let requested = RequestedAxes {
            payment: Some(PaymentStatus::Paid),
            ..Default::default()
        };
        let annotations = Annotations {
            charge_id: Some(charge_id),
            ..Default::default()
        };
        self.execute(
            order_id,
            |axes| state_machine::plan(axes, requested),
            annotations,
        )
        .await
    }

    /// Stores a charge reference without touching any status. Used when a
    /// captured charge could not be recorded as a payment, so the order is
    /// never swept as unpaid.
    pub async fn attach_charge_id(
        &self,
        order_id: Uuid,
        charge_id: &str,
    ) -> Result<(), ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(order::Column::ChargeId, Expr::value(charge_id))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(())
    }

    pub async fn cancel(
        &self,
        order_id: Uuid,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        self.named(order_id, NamedAction::Cancel, note).await
    }

    pub async fn refund(
        &self,
        order_id: Uuid,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        self.named(order_id, NamedAction::Refund, note).await
    }

    pub async fn mark_payment_failed(
        &self,
        order_id: Uuid,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        self.named(order_id, NamedAction::MarkPaymentFailed, note).await
    }

    #[instrument(skip(self, note), fields(order_id = %order_id, action = ?action))]
    async fn named(
        &self,
        order_id: Uuid,
        action: NamedAction,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let annotations = Annotations {
            admin_notes: Some(
                trimmed(note).unwrap_or_else(|| action.default_note().to_string()),
            ),
            ..Default::default()
        };
        self.execute(order_id, |axes| action.plan(axes), annotations)
            .await
    }

    /// Read, plan, write and commit in one transaction; then events, metrics
    /// and queued emails. A rejected plan returns before any write.
    async fn execute<F>(
        &self,
        order_id: Uuid,
        planner: F,
        annotations: Annotations,
    ) -> Result<OrderModel, ServiceError>
    where
        F: FnOnce(OrderAxes) -> Result<TransitionPlan, state_machine::GuardViolation>,
    {
        let txn = self.db.begin().await?;
        let pending = self.write_in(&txn, order_id, planner, annotations).await?;
        txn.commit().await?;
        Ok(self.finish(pending))
    }

    async fn write_in<F>(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        planner: F,
        annotations: Annotations,
    ) -> Result<PendingTransition, ServiceError>
    where
        F: FnOnce(OrderAxes) -> Result<TransitionPlan, state_machine::GuardViolation>,
    {
        let current = OrderEntity::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let plan = planner(axes_of(&current)).map_err(|violation| {
            metrics::GUARD_VIOLATIONS
                .with_label_values(&[violation.axis.to_string().as_str()])
                .inc();
            warn!(%order_id, message = %violation.message, "order transition rejected");
            ServiceError::from(violation)
        })?;

        if plan.is_empty() && annotations.is_empty() {
            return Ok(PendingTransition {
                order: current,
                plan,
                annotations,
            });
        }

        let now = Utc::now();
        let mut active: OrderActiveModel = current.clone().into();

        if let Some((_, to)) = plan.order {
            active.order_status = Set(to);
        }
        if let Some((from, to)) = plan.payment {
            active.payment_status = Set(to);
            if to == PaymentStatus::Paid {
                active.paid_at = Set(Some(now));
            } else if from == PaymentStatus::Paid {
                active.paid_at = Set(None);
            }
        }
        if let Some((_, to)) = plan.fulfillment {
            active.fulfillment_status = Set(to);
        }

        let reached_shipped = matches!(plan.order, Some((_, OrderStatus::Shipped)))
            || matches!(plan.fulfillment, Some((_, FulfillmentStatus::Shipped)));
        let reached_delivered = matches!(plan.order, Some((_, OrderStatus::Delivered)))
            || matches!(plan.fulfillment, Some((_, FulfillmentStatus::Delivered)));
        if (reached_shipped || reached_delivered) && current.shipped_at.is_none() {
            active.shipped_at = Set(Some(now));
        }
        if reached_delivered && current.delivered_at.is_none() {
            active.delivered_at = Set(Some(now));
        }

        if let Some(tracking) = annotations.tracking_number.clone() {
            active.tracking_number = Set(Some(tracking));
        }
        if let Some(courier) = annotations.courier.clone() {
            active.courier = Set(Some(courier));
        }
        if let Some(note) = annotations.admin_notes.clone() {
            active.admin_notes = Set(Some(note));
        }
        if let Some(charge_id) = annotations.charge_id.clone() {
            active.charge_id = Set(Some(charge_id));
        }
        active.updated_at = Set(now);
        active.version = Set(current.version + 1);

        let updated = OrderEntity::update(active)
            .filter(order::Column::Version.eq(current.version))
            .exec(txn)
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => ServiceError::Conflict(format!(
                    "Order {} was modified concurrently, reload and retry",
                    order_id
                )),
                other => {
                    error!(%order_id, error = %other, "failed to update order");
                    ServiceError::DatabaseError(other)
                }
            })?;

        if matches!(plan.order, Some((_, OrderStatus::Cancelled))) {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(txn)
                .await?;
            let requests: Vec<StockRequest> = items
                .iter()
                .map(|item| StockRequest {
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                })
                .collect();
            stock::restock_on(txn, &requests).await?;
        }

        Ok(PendingTransition {
            order: updated,
            plan,
            annotations,
        })
    }

    /// Post-commit side effects of a transition: metrics, events and emails.
    pub fn finish(&self, pending: PendingTransition) -> OrderModel {
        let PendingTransition {
            order,
            plan,
            annotations,
        } = pending;
        self.record_transitions(&order, &plan);
        self.queue_emails(&order, &plan, &annotations);
        order
    }

    fn record_transitions(&self, order: &OrderModel, plan: &TransitionPlan) {
        let mut changes: Vec<(Axis, &'static str, &'static str)> = Vec::new();
        if let Some((from, to)) = plan.order {
            changes.push((Axis::Order, from.as_str(), to.as_str()));
        }
        if let Some((from, to)) = plan.payment {
            changes.push((Axis::Payment, from.as_str(), to.as_str()));
        }
        if let Some((from, to)) = plan.fulfillment {
            changes.push((Axis::Fulfillment, from.as_str(), to.as_str()));
        }

        for (axis, from, to) in changes {
            metrics::ORDER_TRANSITIONS
                .with_label_values(&[axis.to_string().as_str(), to])
                .inc();
            info!(order_id = %order.id, %axis, from, to, "order status changed");
            self.event_sender.publish(Event::OrderStatusChanged {
                order_id: order.id,
                axis,
                old_status: from.to_string(),
                new_status: to.to_string(),
            });
        }
    }

    fn queue_emails(&self, order: &OrderModel, plan: &TransitionPlan, annotations: &Annotations) {
        for kind in emails_for(plan) {
            let note = match kind {
                EmailKind::OrderShipped => order.tracking_number.as_ref().map(|tracking| {
                    match &order.courier {
                        Some(courier) => format!("{} tracking number: {}", courier, tracking),
                        None => format!("Tracking number: {}", tracking),
                    }
                }),
                _ => annotations.admin_notes.clone(),
            };
            self.outbox
                .dispatch(EmailNotification::for_order(kind, order).with_note(note));
        }
    }
}
