use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity},
        order_item::{self, Entity as OrderItemEntity},
        pending_payment::{self, Entity as PendingPaymentEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{PaymentMethod, PaymentStatus, StatusLabel, VerificationStatus},
    notifications::{EmailKind, EmailNotification, EmailOutbox},
    services::order_status::{OrderStatusUpdate, OrderStatusUpdateService},
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusView {
    pub value: &'static str,
    pub label: &'static str,
}

impl StatusView {
    fn of<S: StatusLabel>(status: S) -> Self {
        Self {
            value: status.as_str(),
            label: status.label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub image: Option<String>,
    pub options: Option<serde_json::Value>,
}

impl From<order_item::Model> for OrderItemView {
    fn from(item: order_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            product_name: item.product_name,
            variant_name: item.variant_name,
            unit_price: item.unit_price,
            quantity: item.quantity,
            line_total: item.line_total,
            image: item.image,
            options: item
                .options
                .as_deref()
                .and_then(|o| serde_json::from_str(o).ok()),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingPaymentView {
    pub verification_status: StatusView,
    pub proof_image_url: Option<String>,
    pub customer_reference: Option<String>,
    pub review_notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<pending_payment::Model> for PendingPaymentView {
    fn from(p: pending_payment::Model) -> Self {
        Self {
            verification_status: StatusView::of(p.verification_status),
            proof_image_url: p.proof_image_url,
            customer_reference: p.customer_reference,
            review_notes: p.review_notes,
            submitted_at: p.submitted_at,
            reviewed_at: p.reviewed_at,
        }
    }
}

/// An order with its items, every axis labelled, and its proof-of-payment state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub order_status: StatusView,
    pub payment_status: StatusView,
    pub fulfillment_status: StatusView,
    pub payment_method: PaymentMethod,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub address_line: String,
    pub district_code: String,
    pub address_reference: Option<String>,
    pub shipping_rate_id: String,
    pub shipping_carrier: Option<String>,
    pub shipping_estimated_days: Option<String>,
    pub coupon_code: Option<String>,
    pub tracking_number: Option<String>,
    pub courier: Option<String>,
    /// Internal notes; only present on the admin read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub items: Vec<OrderItemView>,
    pub pending_payment: Option<PendingPaymentView>,
}

impl OrderView {
    pub fn build(
        order: order::Model,
        items: Vec<order_item::Model>,
        pending: Option<pending_payment::Model>,
    ) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            order_status: StatusView::of(order.order_status),
            payment_status: StatusView::of(order.payment_status),
            fulfillment_status: StatusView::of(order.fulfillment_status),
            payment_method: order.payment_method,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            discount: order.discount,
            total: order.total,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            address_line: order.address_line,
            district_code: order.district_code,
            address_reference: order.address_reference,
            shipping_rate_id: order.shipping_rate_id,
            shipping_carrier: order.shipping_carrier,
            shipping_estimated_days: order.shipping_estimated_days,
            coupon_code: order.coupon_code,
            tracking_number: order.tracking_number,
            courier: order.courier,
            admin_notes: order.admin_notes,
            created_at: order.created_at,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            version: order.version,
            items: items.into_iter().map(OrderItemView::from).collect(),
            pending_payment: pending.map(PendingPaymentView::from),
        }
    }

    /// Strips what only staff should see.
    pub fn for_customer(mut self) -> Self {
        self.admin_notes = None;
        self
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct LookupRequest {
    #[validate(length(min = 1))]
    pub view_token: String,
    #[validate(length(min = 3))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct PaymentProofSubmission {
    #[validate(length(min = 1))]
    pub view_token: String,
    pub email: String,
    #[validate(url)]
    pub proof_image_url: String,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct PaymentProofReview {
    pub approved: bool,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
}

fn emails_match(stored: &str, given: &str) -> bool {
    stored.trim().to_lowercase() == given.trim().to_lowercase()
}

/// Customer-facing order lookup and the proof-of-payment workflow.
#[derive(Clone)]
pub struct OrderLookupService {
    db: Arc<DatabaseConnection>,
    status: Arc<OrderStatusUpdateService>,
    event_sender: EventSender,
    outbox: EmailOutbox,
}

impl OrderLookupService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        status: Arc<OrderStatusUpdateService>,
        event_sender: EventSender,
        outbox: EmailOutbox,
    ) -> Self {
        Self {
            db,
            status,
            event_sender,
            outbox,
        }
    }

    fn not_found() -> ServiceError {
        ServiceError::NotFound("Order not found".to_string())
    }

    /// Unknown token and wrong email are indistinguishable to the caller.
    async fn find_for_customer(
        &self,
        view_token: &str,
        email: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::ViewToken.eq(view_token.trim()))
            .one(&*self.db)
            .await?
            .ok_or_else(Self::not_found)?;
        if emails_match(&order.customer_email, email) {
            Ok(order)
        } else {
            Err(Self::not_found())
        }
    }

    async fn pending_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Option<pending_payment::Model>, ServiceError> {
        Ok(PendingPaymentEntity::find()
            .filter(pending_payment::Column::OrderId.eq(order_id))
            .one(conn)
            .await?)
    }

    /// Writes `active` only if the proof is still in `expected`; a concurrent
    /// upload or review in between is a conflict.
    async fn update_proof<C: ConnectionTrait>(
        &self,
        conn: &C,
        active: pending_payment::ActiveModel,
        expected: &[VerificationStatus],
    ) -> Result<(), ServiceError> {
        PendingPaymentEntity::update(active)
            .filter(pending_payment::Column::VerificationStatus.is_in(expected.iter().copied()))
            .exec(conn)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => ServiceError::Conflict(
                    "The payment proof changed meanwhile, reload and retry".to_string(),
                ),
                other => ServiceError::DatabaseError(other),
            })
    }

    async fn view(&self, order: order::Model) -> Result<OrderView, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let pending = self.pending_for(&*self.db, order.id).await?;
        Ok(OrderView::build(order, items, pending))
    }

    #[instrument(skip(self, request))]
    pub async fn lookup(&self, request: LookupRequest) -> Result<OrderView, ServiceError> {
        request.validate()?;
        let order = self
            .find_for_customer(&request.view_token, &request.email)
            .await?;
        Ok(self.view(order).await?.for_customer())
    }

    /// Admin read of any order.
    #[instrument(skip(self))]
    pub async fn get(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.view(order).await
    }

    /// Attaches a proof of payment and queues it for review.
    #[instrument(skip(self, submission))]
    pub async fn submit_payment_proof(
        &self,
        submission: PaymentProofSubmission,
    ) -> Result<OrderView, ServiceError> {
        submission.validate()?;
        let order = self
            .find_for_customer(&submission.view_token, &submission.email)
            .await?;

        let pending = self.pending_for(&*self.db, order.id).await?.ok_or_else(|| {
            ServiceError::InvalidOperation(
                "This order is not paid by bank or mobile transfer".to_string(),
            )
        })?;

        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment is already '{}'",
                order.payment_status.label()
            )));
        }
        if !matches!(
            pending.verification_status,
            VerificationStatus::AwaitingProof | VerificationStatus::Rejected
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "A proof cannot be uploaded while it is '{}'",
                pending.verification_status.label()
            )));
        }

        let mut active: pending_payment::ActiveModel = pending.into();
        active.verification_status = Set(VerificationStatus::UnderReview);
        active.proof_image_url = Set(Some(submission.proof_image_url.trim().to_string()));
        active.customer_reference = Set(submission
            .reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()));
        active.submitted_at = Set(Some(Utc::now()));
        active.reviewed_at = Set(None);
        active.review_notes = Set(None);
        self.update_proof(
            &*self.db,
            active,
            &[VerificationStatus::AwaitingProof, VerificationStatus::Rejected],
        )
        .await?;

        info!(order_id = %order.id, "payment proof submitted");
        self.event_sender
            .publish(Event::PaymentProofSubmitted { order_id: order.id });
        self.outbox
            .dispatch(EmailNotification::for_order(EmailKind::ProofReceived, &order));

        Ok(self.view(order).await?.for_customer())
    }

    /// Approving marks the payment paid; rejecting lets the customer upload again.
    /// The payment transition and the proof's new state commit together.
    #[instrument(skip(self, review), fields(approved = review.approved))]
    pub async fn review_payment_proof(
        &self,
        order_id: Uuid,
        review: PaymentProofReview,
    ) -> Result<OrderView, ServiceError> {
        review.validate()?;
        let txn = self.db.begin().await?;

        let pending = self
            .pending_for(&txn, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No payment proof for order {}", order_id)))?;

        if pending.verification_status != VerificationStatus::UnderReview {
            return Err(ServiceError::InvalidOperation(format!(
                "Proof is '{}', only proofs under review can be reviewed",
                pending.verification_status.label()
            )));
        }

        let note = review
            .admin_notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let transition = if review.approved {
            let update = OrderStatusUpdate {
                payment_status: Some(PaymentStatus::Paid),
                admin_notes: note.clone(),
                ..Default::default()
            };
            Some(self.status.apply_in(&txn, order_id, update).await?)
        } else {
            None
        };

        let mut active: pending_payment::ActiveModel = pending.into();
        active.verification_status = Set(if review.approved {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Rejected
        });
        active.review_notes = Set(note.clone());
        active.reviewed_at = Set(Some(Utc::now()));
        self.update_proof(&txn, active, &[VerificationStatus::UnderReview])
            .await?;

        let order = match transition {
            Some(transition) => {
                txn.commit().await?;
                self.status.finish(transition)
            }
            None => {
                let order = OrderEntity::find_by_id(order_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
                txn.commit().await?;
                order
            }
        };

        self.event_sender.publish(Event::PaymentProofReviewed {
            order_id,
            approved: review.approved,
        });
        if !review.approved {
            self.outbox.dispatch(
                EmailNotification::for_order(EmailKind::ProofRejected, &order).with_note(note),
            );
        }

        self.view(order).await
    }
}
