#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use storefront_orders::{
    config::AppConfig,
    db,
    entities::{order, stock_level},
    events,
    models::{
        AddressInfo, CartLine, CheckoutForm, CouponInfo, CouponKind, CustomerInfo,
        ShippingSelection,
    },
    notifications::{EmailKind, EmailNotification, NotificationError, OrderNotifier},
    services::{
        payments::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway},
        shipping::ShippingRate,
    },
    AppState,
};
use tokio::sync::Notify;
use tower::ServiceExt;
use uuid::Uuid;

/// Collects every email instead of sending it. Can be slowed down to stand
/// in for a mailer that hangs until its timeout.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailNotification>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingNotifier {
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn kinds_for(&self, order_id: Uuid) -> Vec<EmailKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.order_id == order_id)
            .map(|e| e.kind)
            .collect()
    }

    pub fn last_for(&self, order_id: Uuid) -> Option<EmailNotification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.order_id == order_id)
            .cloned()
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn send(&self, email: EmailNotification) -> Result<(), NotificationError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeBehavior {
    Approve,
    Decline,
}

/// Card gateway double. Optionally parks each charge until released so tests
/// can observe the in-flight window.
pub struct ScriptedGateway {
    behavior: Mutex<ChargeBehavior>,
    charges: AtomicUsize,
    hold: Mutex<bool>,
    pub entered: Notify,
    pub release: Notify,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            behavior: Mutex::new(ChargeBehavior::Approve),
            charges: AtomicUsize::new(0),
            hold: Mutex::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

impl ScriptedGateway {
    pub fn set_behavior(&self, behavior: ChargeBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn hold_charges(&self) {
        *self.hold.lock().unwrap() = true;
    }

    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        let hold = *self.hold.lock().unwrap();
        if hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            ChargeBehavior::Approve => Ok(ChargeReceipt {
                charge_id: format!("ch_{}", request.order_number),
                status: "succeeded".to_string(),
            }),
            ChargeBehavior::Decline => Err(GatewayError::Declined("insufficient funds".into())),
        }
    }
}

pub fn shipping_rates() -> Vec<ShippingRate> {
    vec![
        ShippingRate {
            id: "lima-standard".into(),
            label: "Lima standard".into(),
            cost: dec!(15.00),
            carrier: Some("Olva Courier".into()),
            estimated_days: Some("2-3".into()),
            free: false,
        },
        ShippingRate {
            id: "store-pickup".into(),
            label: "Store pickup".into(),
            cost: dec!(0),
            carrier: None,
            estimated_days: None,
            free: true,
        },
    ]
}

/// Application state over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<ScriptedGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.environment = "test".to_string();
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.checkout.shipping_rates = shipping_rates();
        cfg.checkout.redirect_base_url = "https://pay.example.com/checkout".to_string();
        cfg.checkout.stale_unpaid_after_minutes = 60;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            event_sender,
            notifier.clone(),
            gateway.clone(),
        );

        let access_log = slog::Logger::root(slog::Discard, slog::o!());
        let router = storefront_orders::app_router(state.clone(), access_log);

        Self {
            router,
            state,
            notifier,
            gateway,
            _event_task: event_task,
        }
    }

    /// Sends a request through the full middleware stack.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seeds a product with `available` units in stock.
    pub async fn seed_stock(&self, available: i32) -> Uuid {
        let product_id = Uuid::new_v4();
        stock_level::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            variant_id: Set(None),
            available: Set(available),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed stock level");
        product_id
    }

    pub async fn available(&self, product_id: Uuid) -> i32 {
        stock_level::Entity::find()
            .filter(stock_level::Column::ProductId.eq(product_id))
            .one(&*self.state.db)
            .await
            .expect("query stock")
            .map(|s| s.available)
            .unwrap_or(0)
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find()
            .all(&*self.state.db)
            .await
            .expect("query orders")
            .len()
    }

    /// Emails for `order_id` once every queued email has been delivered.
    pub async fn email_kinds(&self, order_id: Uuid) -> Vec<EmailKind> {
        self.state.services.outbox.idle().await;
        self.notifier.kinds_for(order_id)
    }

    pub async fn last_email(&self, order_id: Uuid) -> Option<EmailNotification> {
        self.state.services.outbox.idle().await;
        self.notifier.last_for(order_id)
    }

    /// Moves an order's creation time into the past.
    pub async fn backdate(&self, order_id: Uuid, minutes: i64) {
        let mut active: order::ActiveModel = self.order(order_id).await.into();
        active.created_at = Set(Utc::now() - chrono::Duration::minutes(minutes));
        active.update(&*self.state.db).await.expect("backdate order");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn line(product_id: Uuid, price: Decimal, quantity: i32) -> CartLine {
    CartLine {
        product_id,
        variant_id: None,
        quantity,
        name: "Alpaca wool scarf".into(),
        variant_name: None,
        price,
        image: Some("https://cdn.example.com/scarf.jpg".into()),
        options: None,
    }
}

pub fn valid_form() -> CheckoutForm {
    CheckoutForm {
        customer: CustomerInfo {
            name: "Ana Quispe".into(),
            email: "ana@example.com".into(),
            phone: "987654321".into(),
            dni: None,
        },
        address: AddressInfo {
            line: "Av. Arequipa 1234, Lince".into(),
            district_code: Some("150116".into()),
            reference: None,
        },
        shipping: Some(ShippingSelection {
            rate_id: "lima-standard".into(),
            // The client-side cost is ignored; the configured rate wins.
            cost: Some(dec!(1.00)),
            carrier: None,
            estimated_days: None,
        }),
        coupon: None,
        terms_accepted: true,
    }
}

pub fn ten_percent_off() -> CouponInfo {
    CouponInfo {
        code: Some("HOLA10".into()),
        kind: Some(CouponKind::Percentage),
        discount: Some(dec!(10)),
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
