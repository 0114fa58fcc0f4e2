use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::PaymentMethod;
use crate::services::state_machine::Axis;

/// Domain and telemetry events published by checkout and order updates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    // Checkout telemetry
    CheckoutInitiated {
        session_id: Uuid,
        item_count: usize,
        value: Decimal,
    },
    PaymentInfoAdded {
        session_id: Uuid,
        payment_method: PaymentMethod,
    },

    // Order events
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        payment_method: PaymentMethod,
        total: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        axis: Axis,
        old_status: String,
        new_status: String,
    },

    // Payment events
    PaymentCaptured {
        order_id: Uuid,
        amount: Decimal,
        charge_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },
    /// The gateway captured the charge but the order was not marked paid.
    PaymentCapturedUnrecorded {
        order_id: Uuid,
        charge_id: String,
        reason: String,
    },
    PaymentProofSubmitted {
        order_id: Uuid,
    },
    PaymentProofReviewed {
        order_id: Uuid,
        approved: bool,
    },

    // Reconciliation
    UnpaidOrdersSwept {
        count: usize,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CheckoutInitiated { .. } => "checkout_initiated",
            Event::PaymentInfoAdded { .. } => "payment_info_added",
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentCaptured { .. } => "payment_captured",
            Event::PaymentFailed { .. } => "payment_failed",
            Event::PaymentCapturedUnrecorded { .. } => "payment_captured_unrecorded",
            Event::PaymentProofSubmitted { .. } => "payment_proof_submitted",
            Event::PaymentProofReviewed { .. } => "payment_proof_reviewed",
            Event::UnpaidOrdersSwept { .. } => "unpaid_orders_swept",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Fire-and-forget publish. A full or closed channel drops the event with a
    /// warning; callers never wait on or fail because of telemetry.
    pub fn publish(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => debug!(event = name, "event published"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = name, "event channel full, dropping event")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event = name, "event channel closed, dropping event")
            }
        }
    }
}

/// Creates a bounded channel and its sender.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Drains the channel and logs each event; downstream sinks hook in here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                payment_method,
                total,
            } => {
                info!(%order_id, %order_number, %payment_method, %total, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                axis,
                old_status,
                new_status,
            } => {
                info!(%order_id, %axis, %old_status, %new_status, "order status changed");
            }
            Event::PaymentCaptured {
                order_id, amount, ..
            } => {
                info!(%order_id, %amount, "payment captured");
            }
            Event::PaymentFailed { order_id, reason } => {
                warn!(%order_id, %reason, "payment failed");
            }
            Event::PaymentCapturedUnrecorded {
                order_id,
                charge_id,
                reason,
            } => {
                error!(%order_id, %charge_id, %reason, "captured charge needs manual reconciliation");
            }
            other => {
                let payload = serde_json::to_string(other).unwrap_or_default();
                info!(event = other.name(), %payload, "event received");
            }
        }
    }

    warn!("Event processing loop has ended");
}
