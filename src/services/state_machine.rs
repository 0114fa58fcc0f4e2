//! Transition tables for the three status axes of an order.
//!
//! Each axis is an enum whose adjacency is an exhaustive `match`, so adding a
//! state without deciding its successors fails to compile. Business guards
//! (cancel, refund, mark-failed, ship) are separate pure functions over an
//! [`OrderAxes`] snapshot and are composed on top of adjacency by [`plan`].
//! Nothing here touches the database.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{FulfillmentStatus, OrderStatus, PaymentStatus, StatusLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Axis {
    Order,
    Payment,
    Fulfillment,
}

/// Named business rule layered over plain adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Guard {
    Cancel,
    Refund,
    MarkPaymentFailed,
    Ship,
}

/// A state of one axis.
pub trait AxisState: StatusLabel + PartialEq + 'static {
    const AXIS: Axis;

    /// States directly reachable from `self`.
    fn allowed_next(self) -> &'static [Self];

    fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_next().contains(&to)
    }
}

impl AxisState for OrderStatus {
    const AXIS: Axis = Axis::Order;

    fn allowed_next(self) -> &'static [Self] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Shipped, Cancelled],
            Shipped => &[Delivered],
            Delivered => &[],
            Cancelled => &[],
        }
    }
}

impl AxisState for PaymentStatus {
    const AXIS: Axis = Axis::Payment;

    fn allowed_next(self) -> &'static [Self] {
        use PaymentStatus::*;
        match self {
            Pending => &[Paid, Failed],
            // failed after paid is a reversal or chargeback
            Paid => &[Refunded, Failed],
            Failed => &[],
            Refunded => &[],
        }
    }
}

impl AxisState for FulfillmentStatus {
    const AXIS: Axis = Axis::Fulfillment;

    fn allowed_next(self) -> &'static [Self] {
        use FulfillmentStatus::*;
        match self {
            Unfulfilled => &[Processing],
            Processing => &[Shipped],
            Shipped => &[Delivered],
            Delivered => &[],
        }
    }
}

/// Rejection of a transition or named action. Carries enough to tell the admin
/// which axis or guard refused and between which states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, thiserror::Error)]
#[error("{message}")]
pub struct GuardViolation {
    pub axis: Axis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    pub from: &'static str,
    pub to: &'static str,
    pub message: String,
}

impl GuardViolation {
    pub fn transition<S: AxisState>(from: S, to: S) -> Self {
        let message = if from.is_terminal() {
            format!(
                "{} status '{}' is final and cannot change to '{}'",
                S::AXIS,
                from.label(),
                to.label()
            )
        } else {
            format!(
                "{} status cannot change from '{}' to '{}'",
                S::AXIS,
                from.label(),
                to.label()
            )
        };
        Self {
            axis: S::AXIS,
            guard: None,
            from: from.as_str(),
            to: to.as_str(),
            message,
        }
    }

    pub fn guard<S: AxisState>(guard: Guard, from: S, to: S, reason: &str) -> Self {
        Self {
            axis: S::AXIS,
            guard: Some(guard),
            from: from.as_str(),
            to: to.as_str(),
            message: format!("{} is not allowed: {}", guard, reason),
        }
    }
}

/// `Ok` when `to` is directly reachable from `from`.
pub fn validate_transition<S: AxisState>(from: S, to: S) -> Result<(), GuardViolation> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(GuardViolation::transition(from, to))
    }
}

/// Current value of every axis of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderAxes {
    pub order: OrderStatus,
    pub payment: PaymentStatus,
    pub fulfillment: FulfillmentStatus,
}

impl OrderAxes {
    pub fn initial() -> Self {
        Self {
            order: OrderStatus::Pending,
            payment: PaymentStatus::Pending,
            fulfillment: FulfillmentStatus::Unfulfilled,
        }
    }
}

/// Not terminal and not yet past "being prepared" on either the order or the
/// fulfillment axis.
pub fn can_cancel(axes: &OrderAxes) -> bool {
    let order_open = matches!(
        axes.order,
        OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing
    );
    let not_dispatched = matches!(
        axes.fulfillment,
        FulfillmentStatus::Unfulfilled | FulfillmentStatus::Processing
    );
    !axes.order.is_terminal() && order_open && not_dispatched
}

/// Only a charged payment can be refunded.
pub fn can_refund(axes: &OrderAxes) -> bool {
    axes.payment == PaymentStatus::Paid
}

pub fn can_mark_payment_failed(axes: &OrderAxes) -> bool {
    !axes.payment.is_terminal()
}

/// A cancelled order is never dispatched.
pub fn can_ship(order: OrderStatus) -> bool {
    order != OrderStatus::Cancelled
}

/// Requested target per axis; `None` leaves the axis alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestedAxes {
    pub order: Option<OrderStatus>,
    pub payment: Option<PaymentStatus>,
    pub fulfillment: Option<FulfillmentStatus>,
}

/// Validated outcome of [`plan`]: only the axes that actually change are `Some`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    pub order: Option<(OrderStatus, OrderStatus)>,
    pub payment: Option<(PaymentStatus, PaymentStatus)>,
    pub fulfillment: Option<(FulfillmentStatus, FulfillmentStatus)>,
}

impl TransitionPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_none() && self.payment.is_none() && self.fulfillment.is_none()
    }

    pub fn apply_to(&self, axes: OrderAxes) -> OrderAxes {
        OrderAxes {
            order: self.order.map(|(_, to)| to).unwrap_or(axes.order),
            payment: self.payment.map(|(_, to)| to).unwrap_or(axes.payment),
            fulfillment: self
                .fulfillment
                .map(|(_, to)| to)
                .unwrap_or(axes.fulfillment),
        }
    }
}

/// Checks every requested axis against its current value. Requesting the
/// current value is a no-op for that axis. The first violation rejects the
/// whole request.
pub fn plan(current: OrderAxes, requested: RequestedAxes) -> Result<TransitionPlan, GuardViolation> {
    let mut out = TransitionPlan::default();

    if let Some(to) = requested.order.filter(|to| *to != current.order) {
        validate_transition(current.order, to)?;
        if to == OrderStatus::Cancelled && !can_cancel(&current) {
            return Err(GuardViolation::guard(
                Guard::Cancel,
                current.order,
                to,
                "the order has already been dispatched",
            ));
        }
        out.order = Some((current.order, to));
    }

    if let Some(to) = requested.payment.filter(|to| *to != current.payment) {
        validate_transition(current.payment, to)?;
        out.payment = Some((current.payment, to));
    }

    if let Some(to) = requested
        .fulfillment
        .filter(|to| *to != current.fulfillment)
    {
        validate_transition(current.fulfillment, to)?;
        let resulting_order = out.order.map(|(_, o)| o).unwrap_or(current.order);
        let dispatching = matches!(
            to,
            FulfillmentStatus::Shipped | FulfillmentStatus::Delivered
        );
        if dispatching && !can_ship(resulting_order) {
            return Err(GuardViolation::guard(
                Guard::Ship,
                current.fulfillment,
                to,
                "the order is cancelled",
            ));
        }
        out.fulfillment = Some((current.fulfillment, to));
    }

    Ok(out)
}

/// Named admin actions with a fixed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NamedAction {
    Cancel,
    Refund,
    MarkPaymentFailed,
}

impl NamedAction {
    pub fn guard(&self) -> Guard {
        match self {
            NamedAction::Cancel => Guard::Cancel,
            NamedAction::Refund => Guard::Refund,
            NamedAction::MarkPaymentFailed => Guard::MarkPaymentFailed,
        }
    }

    pub fn requested(&self) -> RequestedAxes {
        match self {
            NamedAction::Cancel => RequestedAxes {
                order: Some(OrderStatus::Cancelled),
                ..Default::default()
            },
            NamedAction::Refund => RequestedAxes {
                payment: Some(PaymentStatus::Refunded),
                ..Default::default()
            },
            NamedAction::MarkPaymentFailed => RequestedAxes {
                payment: Some(PaymentStatus::Failed),
                ..Default::default()
            },
        }
    }

    pub fn default_note(&self) -> &'static str {
        match self {
            NamedAction::Cancel => "Order cancelled by the store.",
            NamedAction::Refund => "Payment refunded to the customer.",
            NamedAction::MarkPaymentFailed => "Payment could not be verified.",
        }
    }

    /// Checks the action's guard, then plans its fixed transition.
    pub fn plan(&self, current: OrderAxes) -> Result<TransitionPlan, GuardViolation> {
        match self {
            NamedAction::Cancel if !can_cancel(&current) => Err(GuardViolation::guard(
                Guard::Cancel,
                current.order,
                OrderStatus::Cancelled,
                "the order is final or has already been dispatched",
            )),
            NamedAction::Refund if !can_refund(&current) => Err(GuardViolation::guard(
                Guard::Refund,
                current.payment,
                PaymentStatus::Refunded,
                "the payment has not been received",
            )),
            NamedAction::MarkPaymentFailed if !can_mark_payment_failed(&current) => {
                Err(GuardViolation::guard(
                    Guard::MarkPaymentFailed,
                    current.payment,
                    PaymentStatus::Failed,
                    "the payment is already final",
                ))
            }
            _ => plan(current, self.requested()),
        }
    }
}
