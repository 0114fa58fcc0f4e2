pub mod admin_orders;
pub mod checkout;
pub mod health;
pub mod storefront;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    notifications::{EmailOutbox, OrderNotifier},
    services::{
        checkout::CheckoutOrchestrator,
        order_lookup::OrderLookupService,
        order_status::OrderStatusUpdateService,
        payments::{PaymentGateway, PaymentProcessor},
        reconciliation::UnpaidOrderReconciler,
        sessions::CheckoutSessionStore,
        shipping::{ConfiguredShippingRates, ShippingRates},
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub sessions: CheckoutSessionStore,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub payments: Arc<PaymentProcessor>,
    pub order_status: Arc<OrderStatusUpdateService>,
    pub lookup: Arc<OrderLookupService>,
    pub reconciler: Arc<UnpaidOrderReconciler>,
    pub outbox: EmailOutbox,
}

impl AppServices {
    /// Wires every service from configuration. The notifier and gateway are
    /// passed in so tests and the admin CLI can substitute their own. Must run
    /// inside a tokio runtime: the email outbox spawns its worker here.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: EventSender,
        notifier: Arc<dyn OrderNotifier>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let sessions = CheckoutSessionStore::new();
        let outbox = EmailOutbox::start(notifier);
        let rates: Arc<dyn ShippingRates> = Arc::new(ConfiguredShippingRates::new(
            config.checkout.shipping_rates.iter().cloned(),
        ));

        let order_status = Arc::new(OrderStatusUpdateService::new(
            db_pool.clone(),
            event_sender.clone(),
            outbox.clone(),
        ));
        let checkout = CheckoutOrchestrator::new(
            db_pool.clone(),
            rates,
            sessions.clone(),
            event_sender.clone(),
            outbox.clone(),
            config.checkout.clone(),
        );
        let payments = Arc::new(PaymentProcessor::new(
            checkout.clone(),
            order_status.clone(),
            gateway,
            event_sender.clone(),
            config.payment_gateway.currency.clone(),
        ));
        let lookup = Arc::new(OrderLookupService::new(
            db_pool.clone(),
            order_status.clone(),
            event_sender.clone(),
            outbox.clone(),
        ));
        let reconciler = Arc::new(UnpaidOrderReconciler::new(
            db_pool,
            order_status.clone(),
            event_sender,
            config.checkout.stale_unpaid_after_minutes,
        ));

        Self {
            sessions,
            checkout: Arc::new(checkout),
            payments,
            order_status,
            lookup,
            reconciler,
            outbox,
        }
    }
}
