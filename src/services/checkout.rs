//! Checkout submission: field validation, server-side totals, the stock
//! re-check and the single transaction that creates an order.
//!
//! The card path shares everything up to the commit with
//! [`PaymentProcessor`](crate::services::payments::PaymentProcessor), which
//! creates the order only once a card token arrives.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::CheckoutConfig,
    entities::{
        order::{self, Entity as Order},
        order_item, pending_payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{
        CartLine, CheckoutField, CheckoutForm, CheckoutOutcome, CheckoutRoute, CouponInfo,
        CouponKind, FulfillmentStatus, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus,
        VerificationStatus,
    },
    notifications::{EmailKind, EmailNotification, EmailOutbox},
    services::{
        sessions::CheckoutSessionStore,
        shipping::{ShippingRate, ShippingRates},
        stock::{self, StockCheck, StockRequest, StockReservationGuard},
    },
};

const MIN_NAME_LEN: usize = 3;
const MIN_PHONE_LEN: usize = 9;
const MIN_ADDRESS_LEN: usize = 10;
const MAX_LINE_QUANTITY: i32 = 999;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

fn max_unit_price() -> Decimal {
    Decimal::new(1_000_000, 0)
}

/// A checkout attempt as received from the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSubmission {
    pub session_id: Uuid,
    pub items: Vec<CartLine>,
    pub form: CheckoutForm,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Validated checkout with shipping re-resolved and totals computed.
#[derive(Debug, Clone)]
pub struct PreparedCheckout {
    pub items: Vec<CartLine>,
    pub form: CheckoutForm,
    pub district_code: String,
    pub rate: ShippingRate,
    pub totals: OrderTotals,
}

impl PreparedCheckout {
    pub fn stock_requests(&self) -> Vec<StockRequest> {
        self.items.iter().map(StockRequest::from).collect()
    }
}

#[derive(Debug, Clone)]
pub struct CommittedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    /// True when an earlier order with the same idempotency key was returned.
    pub replayed: bool,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Field checks in the order the storefront expects; the first failure wins.
pub fn validate_form(items: &[CartLine], form: &CheckoutForm) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::field(CheckoutField::Cart, "Your cart is empty"));
    }
    if non_blank(form.address.district_code.as_deref()).is_none() {
        return Err(ServiceError::field(
            CheckoutField::District,
            "Please select a district",
        ));
    }
    if non_blank(form.shipping.as_ref().map(|s| s.rate_id.as_str())).is_none() {
        return Err(ServiceError::field(
            CheckoutField::ShippingRate,
            "Please select a shipping option",
        ));
    }
    if !form.terms_accepted {
        return Err(ServiceError::field(
            CheckoutField::Terms,
            "You must accept the terms and conditions",
        ));
    }
    if form.customer.name.trim().chars().count() < MIN_NAME_LEN {
        return Err(ServiceError::field(
            CheckoutField::Name,
            "Please enter your full name",
        ));
    }
    if !form.customer.email.trim().contains('@') {
        return Err(ServiceError::field(
            CheckoutField::Email,
            "Please enter a valid email address",
        ));
    }
    if form.customer.phone.trim().chars().count() < MIN_PHONE_LEN {
        return Err(ServiceError::field(
            CheckoutField::Phone,
            "Please enter a valid phone number",
        ));
    }
    if form.address.line.trim().chars().count() < MIN_ADDRESS_LEN {
        return Err(ServiceError::field(
            CheckoutField::Address,
            "Please enter your full address",
        ));
    }
    for line in items {
        if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity)
            || line.price.is_sign_negative()
            || line.price > max_unit_price()
        {
            return Err(ServiceError::field(
                CheckoutField::Cart,
                format!("Invalid quantity or price for {}", line.name),
            ));
        }
    }
    Ok(())
}

/// Discount a coupon grants on `subtotal`, before rounding.
pub fn coupon_discount(coupon: Option<&CouponInfo>, subtotal: Decimal) -> Decimal {
    let Some(coupon) = coupon else {
        return Decimal::ZERO;
    };
    let value = coupon.discount.unwrap_or_default();
    match coupon.kind {
        Some(CouponKind::Percentage) => {
            let percent = value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
            subtotal.saturating_mul(percent) / Decimal::ONE_HUNDRED
        }
        Some(CouponKind::Fixed) => value.max(Decimal::ZERO).min(subtotal),
        Some(CouponKind::FreeShipping) | None => Decimal::ZERO,
    }
}

/// Totals derived from cart prices, the resolved rate and the coupon.
/// `total` is computed from the rounded parts so the balance holds exactly.
pub fn compute_totals(
    items: &[CartLine],
    rate: &ShippingRate,
    coupon: Option<&CouponInfo>,
) -> OrderTotals {
    let subtotal = items
        .iter()
        .map(CartLine::line_total)
        .fold(Decimal::ZERO, Decimal::saturating_add)
        .round_dp(2);

    let free_shipping_coupon =
        matches!(coupon.and_then(|c| c.kind), Some(CouponKind::FreeShipping));
    let shipping_cost = if free_shipping_coupon {
        Decimal::ZERO
    } else {
        rate.effective_cost().round_dp(2)
    };

    let discount = coupon_discount(coupon, subtotal).round_dp(2);

    OrderTotals {
        subtotal,
        shipping_cost,
        discount,
        total: subtotal.saturating_add(shipping_cost) - discount,
    }
}

fn order_number(prefix: &str) -> String {
    format!("{}-{}", prefix, hex::encode_upper(rand::random::<[u8; 4]>()))
}

fn view_token() -> String {
    hex::encode(rand::random::<[u8; 24]>())
}

/// Stored form of a client key. Keys only collapse submissions from the same
/// checkout session; another session reusing the value gets its own order.
pub fn scoped_idempotency_key(session_id: Uuid, key: &str) -> Result<String, ServiceError> {
    let key = key.trim();
    if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ServiceError::ValidationError(format!(
            "idempotency key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    Ok(format!("{}:{}", session_id, key))
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    db: Arc<DatabaseConnection>,
    stock: StockReservationGuard,
    rates: Arc<dyn ShippingRates>,
    sessions: CheckoutSessionStore,
    event_sender: EventSender,
    outbox: EmailOutbox,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        rates: Arc<dyn ShippingRates>,
        sessions: CheckoutSessionStore,
        event_sender: EventSender,
        outbox: EmailOutbox,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            stock: StockReservationGuard::new(db.clone()),
            db,
            rates,
            sessions,
            event_sender,
            outbox,
            config,
        }
    }

    pub fn sessions(&self) -> &CheckoutSessionStore {
        &self.sessions
    }

    /// Advisory stock check for the session's cart. Reserves nothing.
    #[instrument(skip(self))]
    pub async fn check_availability(&self, session_id: Uuid) -> Result<StockCheck, ServiceError> {
        let cart = self
            .sessions
            .get(session_id)
            .map(|s| s.cart())
            .unwrap_or_default();
        let requests: Vec<StockRequest> = cart.iter().map(StockRequest::from).collect();
        self.stock.check(&requests).await
    }

    /// Validates the form and resolves shipping and totals. No I/O.
    pub fn prepare(
        &self,
        items: &[CartLine],
        form: &CheckoutForm,
    ) -> Result<PreparedCheckout, ServiceError> {
        if let Err(e) = validate_form(items, form) {
            metrics::CHECKOUT_REJECTIONS
                .with_label_values(&["validation"])
                .inc();
            return Err(e);
        }

        let rate_id = form
            .shipping
            .as_ref()
            .map(|s| s.rate_id.as_str())
            .unwrap_or_default();
        let rate = self.rates.resolve(rate_id).ok_or_else(|| {
            metrics::CHECKOUT_REJECTIONS
                .with_label_values(&["validation"])
                .inc();
            ServiceError::field(
                CheckoutField::ShippingRate,
                "The selected shipping option is no longer available",
            )
        })?;

        let totals = compute_totals(items, &rate, form.coupon.as_ref());
        let district_code = form
            .address
            .district_code
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        Ok(PreparedCheckout {
            items: items.to_vec(),
            form: form.clone(),
            district_code,
            rate,
            totals,
        })
    }

    /// Stock check right before commit; converts a shortage into the retryable error.
    pub async fn recheck_stock(&self, prepared: &PreparedCheckout) -> Result<(), ServiceError> {
        let result = self.stock.check(&prepared.stock_requests()).await?.into_result();
        if result.is_err() {
            metrics::CHECKOUT_REJECTIONS.with_label_values(&["stock"]).inc();
        }
        result
    }

    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::IdempotencyKey.eq(key))
            .one(&*self.db)
            .await?)
    }

    /// Inserts the order, its items, the stock decrements and (for proof-based
    /// methods) the pending payment in one transaction. Any failure rolls
    /// everything back.
    #[instrument(skip(self, prepared), fields(total = %prepared.totals.total))]
    pub async fn commit(
        &self,
        prepared: &PreparedCheckout,
        payment_method: PaymentMethod,
        idempotency_key: Option<String>,
    ) -> Result<CommittedOrder, ServiceError> {
        let txn = self.db.begin().await?;

        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = Order::find()
                .filter(order::Column::IdempotencyKey.eq(key))
                .one(&txn)
                .await?
            {
                txn.commit().await?;
                info!(order_id = %existing.id, "idempotency key matched an existing order");
                return Ok(CommittedOrder {
                    order: existing,
                    items: Vec::new(),
                    replayed: true,
                });
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let form = &prepared.form;
        let shipping = form.shipping.as_ref();
        let coupon_code = form
            .coupon
            .as_ref()
            .and_then(|c| non_blank(c.code.as_deref()))
            .map(str::to_string);

        let new_order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number(&self.config.order_number_prefix)),
            order_status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            fulfillment_status: Set(FulfillmentStatus::Unfulfilled),
            payment_method: Set(payment_method),
            subtotal: Set(prepared.totals.subtotal),
            shipping_cost: Set(prepared.totals.shipping_cost),
            discount: Set(prepared.totals.discount),
            total: Set(prepared.totals.total),
            customer_name: Set(form.customer.name.trim().to_string()),
            customer_email: Set(form.customer.email.trim().to_string()),
            customer_phone: Set(form.customer.phone.trim().to_string()),
            customer_dni: Set(non_blank(form.customer.dni.as_deref()).map(str::to_string)),
            address_line: Set(form.address.line.trim().to_string()),
            district_code: Set(prepared.district_code.clone()),
            address_reference: Set(
                non_blank(form.address.reference.as_deref()).map(str::to_string)
            ),
            shipping_rate_id: Set(prepared.rate.id.clone()),
            shipping_carrier: Set(prepared
                .rate
                .carrier
                .clone()
                .or_else(|| shipping.and_then(|s| s.carrier.clone()))),
            shipping_estimated_days: Set(prepared
                .rate
                .estimated_days
                .clone()
                .or_else(|| shipping.and_then(|s| s.estimated_days.clone()))),
            coupon_code: Set(coupon_code),
            admin_notes: Set(None),
            tracking_number: Set(None),
            courier: Set(None),
            charge_id: Set(None),
            view_token: Set(view_token()),
            idempotency_key: Set(idempotency_key.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            paid_at: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            version: Set(1),
        };

        let order = match new_order.insert(&txn).await {
            Ok(order) => order,
            Err(e) => {
                drop(txn);
                // A concurrent request with the same key won the unique index.
                if let Some(key) = idempotency_key.as_deref() {
                    if let Some(existing) = self.find_by_idempotency_key(key).await? {
                        return Ok(CommittedOrder {
                            order: existing,
                            items: Vec::new(),
                            replayed: true,
                        });
                    }
                }
                return Err(e.into());
            }
        };

        let mut items = Vec::with_capacity(prepared.items.len());
        for line in &prepared.items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                product_name: Set(line.name.clone()),
                variant_name: Set(line.variant_name.clone()),
                unit_price: Set(line.price),
                quantity: Set(line.quantity),
                line_total: Set(line.line_total().round_dp(2)),
                image: Set(line.image.clone()),
                options: Set(line.options.as_ref().map(|o| o.to_string())),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        stock::decrement_on(&txn, &prepared.stock_requests()).await?;

        if payment_method.requires_proof() {
            pending_payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                verification_status: Set(VerificationStatus::AwaitingProof),
                proof_image_url: Set(None),
                customer_reference: Set(None),
                review_notes: Set(None),
                created_at: Set(now),
                submitted_at: Set(None),
                reviewed_at: Set(None),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        metrics::ORDERS_CREATED
            .with_label_values(&[payment_method.as_str()])
            .inc();
        info!(order_id = %order.id, order_number = %order.order_number, "order created");

        Ok(CommittedOrder {
            order,
            items,
            replayed: false,
        })
    }

    /// Where to send the shopper once `order` exists.
    pub fn route_for(&self, order: &order::Model) -> Result<CheckoutRoute, ServiceError> {
        match order.payment_method {
            PaymentMethod::BankTransfer | PaymentMethod::MobileTransfer => {
                Ok(CheckoutRoute::UploadProof {
                    order_id: order.id,
                    view_token: order.view_token.clone(),
                })
            }
            PaymentMethod::ExternalRedirect => {
                let mut url = reqwest::Url::parse(&self.config.redirect_base_url).map_err(|e| {
                    ServiceError::InternalError(format!("Invalid redirect base URL: {}", e))
                })?;
                url.query_pairs_mut()
                    .append_pair("order", &order.order_number)
                    .append_pair("amount", &order.total.round_dp(2).to_string());
                Ok(CheckoutRoute::Redirect { url: url.into() })
            }
            PaymentMethod::Card => Ok(CheckoutRoute::AwaitCardToken),
        }
    }

    fn outcome(&self, order: &order::Model) -> Result<CheckoutOutcome, ServiceError> {
        Ok(CheckoutOutcome {
            order_id: Some(order.id),
            order_number: Some(order.order_number.clone()),
            payment_method: order.payment_method,
            route: self.route_for(order)?,
        })
    }

    pub(crate) fn publish_initiated(
        &self,
        session_id: Uuid,
        prepared: &PreparedCheckout,
        payment_method: PaymentMethod,
    ) {
        self.event_sender.publish(Event::CheckoutInitiated {
            session_id,
            item_count: prepared.items.len(),
            value: prepared.totals.total,
        });
        self.event_sender.publish(Event::PaymentInfoAdded {
            session_id,
            payment_method,
        });
    }

    pub(crate) fn publish_order_created(&self, order: &order::Model) {
        self.event_sender.publish(Event::OrderCreated {
            order_id: order.id,
            order_number: order.order_number.clone(),
            payment_method: order.payment_method,
            total: order.total,
        });
    }

    /// Post-commit side effects for orders that wait on a later payment.
    fn after_order_created(&self, session_id: Uuid, order: &order::Model) {
        self.sessions.clear_after_order(session_id);
        self.publish_order_created(order);
        self.outbox
            .dispatch(EmailNotification::for_order(EmailKind::OrderReceived, order));
    }

    /// Full submission for every payment method. Card submissions stop after
    /// validation and the stock check: the order is created when the token
    /// arrives.
    #[instrument(
        skip(self, submission),
        fields(session_id = %submission.session_id, payment_method = %submission.payment_method)
    )]
    pub async fn submit(&self, submission: CheckoutSubmission) -> Result<CheckoutOutcome, ServiceError> {
        let session = self.sessions.get_or_create(submission.session_id);
        let _permit = match session.guard().try_permit() {
            Some(permit) => permit,
            None => {
                metrics::DUPLICATE_SUBMISSIONS.inc();
                return Err(ServiceError::Conflict(
                    "A checkout submission is already in progress".to_string(),
                ));
            }
        };

        let prepared = self.prepare(&submission.items, &submission.form)?;
        let idempotency_key = submission
            .idempotency_key
            .as_deref()
            .map(|key| scoped_idempotency_key(submission.session_id, key))
            .transpose()?;

        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                info!(order_id = %existing.id, "returning order for repeated submission");
                self.sessions.clear_after_order(submission.session_id);
                return self.outcome(&existing);
            }
        }

        self.recheck_stock(&prepared).await?;
        self.publish_initiated(submission.session_id, &prepared, submission.payment_method);

        if submission.payment_method == PaymentMethod::Card {
            return Ok(CheckoutOutcome {
                order_id: None,
                order_number: None,
                payment_method: PaymentMethod::Card,
                route: CheckoutRoute::AwaitCardToken,
            });
        }

        let committed = self
            .commit(&prepared, submission.payment_method, idempotency_key)
            .await
            .map_err(|e| {
                if matches!(e, ServiceError::StockUnavailable(_)) {
                    metrics::CHECKOUT_REJECTIONS.with_label_values(&["stock"]).inc();
                    warn!("stock ran out between check and commit");
                }
                e
            })?;

        if committed.replayed {
            self.sessions.clear_after_order(submission.session_id);
        } else {
            self.after_order_created(submission.session_id, &committed.order);
        }

        self.outcome(&committed.order)
    }
}
