/*!
 * # Metrics Module
 *
 * Prometheus counters for checkout, payments and order transitions, exposed
 * in text format at `/metrics`.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("storefront".into()), None)
        .expect("registry can be created");
    pub static ref ORDERS_CREATED: IntCounterVec = IntCounterVec::new(
        Opts::new("orders_created_total", "Orders created by payment method"),
        &["payment_method"]
    )
    .expect("metric can be created");
    pub static ref CHECKOUT_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "checkout_rejections_total",
            "Checkout submissions rejected before an order was created"
        ),
        &["reason"]
    )
    .expect("metric can be created");
    pub static ref DUPLICATE_SUBMISSIONS: IntCounter = IntCounter::new(
        "checkout_duplicate_submissions_total",
        "Submissions ignored because one was already in flight"
    )
    .expect("metric can be created");
    pub static ref PAYMENT_CHARGES: IntCounterVec = IntCounterVec::new(
        Opts::new("payment_charges_total", "Card charge attempts by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");
    pub static ref PAYMENT_CHARGE_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("payment_charge_seconds", "Card gateway call latency"),
        &["outcome"]
    )
    .expect("metric can be created");
    pub static ref ORDER_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("order_transitions_total", "Applied status transitions"),
        &["axis", "to"]
    )
    .expect("metric can be created");
    pub static ref GUARD_VIOLATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("order_guard_violations_total", "Rejected status transitions"),
        &["axis"]
    )
    .expect("metric can be created");
    pub static ref UNPAID_ORDERS_SWEPT: IntCounter = IntCounter::new(
        "unpaid_orders_swept_total",
        "Stale unpaid card orders cancelled by the sweep"
    )
    .expect("metric can be created");
}

/// Registers every collector once. Later calls are no-ops.
pub fn register_metrics() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ORDERS_CREATED.clone()),
            Box::new(CHECKOUT_REJECTIONS.clone()),
            Box::new(DUPLICATE_SUBMISSIONS.clone()),
            Box::new(PAYMENT_CHARGES.clone()),
            Box::new(PAYMENT_CHARGE_SECONDS.clone()),
            Box::new(ORDER_TRANSITIONS.clone()),
            Box::new(GUARD_VIOLATIONS.clone()),
            Box::new(UNPAID_ORDERS_SWEPT.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn gather_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub async fn metrics_handler() -> Response {
    match gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
