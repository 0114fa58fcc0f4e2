use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::MailerConfig;
use crate::entities::order;

/// Which transactional email to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmailKind {
    OrderReceived,
    PaymentConfirmed,
    OrderConfirmed,
    OrderPreparing,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    PaymentRefunded,
    PaymentFailed,
    ProofReceived,
    ProofRejected,
}

impl EmailKind {
    fn subject_prefix(&self) -> &'static str {
        match self {
            EmailKind::OrderReceived => "We received your order",
            EmailKind::PaymentConfirmed => "Payment confirmed",
            EmailKind::OrderConfirmed => "Your order is confirmed",
            EmailKind::OrderPreparing => "Your order is being prepared",
            EmailKind::OrderShipped => "Your order is on its way",
            EmailKind::OrderDelivered => "Your order was delivered",
            EmailKind::OrderCancelled => "Your order was cancelled",
            EmailKind::PaymentRefunded => "Your payment was refunded",
            EmailKind::PaymentFailed => "We could not verify your payment",
            EmailKind::ProofReceived => "We received your proof of payment",
            EmailKind::ProofRejected => "Your proof of payment was rejected",
        }
    }
}

/// One email about one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub kind: EmailKind,
    pub order_id: Uuid,
    pub order_number: String,
    pub to: String,
    pub customer_name: String,
    pub subject: String,
    /// Admin note or tracking details shown in the email body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl EmailNotification {
    pub fn for_order(kind: EmailKind, order: &order::Model) -> Self {
        Self {
            kind,
            order_id: order.id,
            order_number: order.order_number.clone(),
            to: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            subject: format!("{} ({})", kind.subject_prefix(), order.order_number),
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// Notification errors. Never surfaced to shoppers or admins.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Mailer rejected the message with status {0}")]
    Rejected(u16),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn send(&self, email: EmailNotification) -> Result<(), NotificationError>;
}

/// Sends and logs failures at `warn`; the caller's operation has already
/// succeeded and must not be rolled back because an email bounced.
pub async fn notify_best_effort(notifier: &dyn OrderNotifier, email: EmailNotification) {
    let kind = email.kind;
    let order_id = email.order_id;
    if let Err(e) = notifier.send(email).await {
        warn!(%order_id, %kind, error = %e, "failed to send order email");
    }
}

#[derive(Default)]
struct Backlog {
    queued: AtomicUsize,
    drained: Notify,
}

/// Detached email dispatch. `dispatch` only enqueues, so a slow or failing
/// mailer never holds up the operation that produced the email. A single
/// worker delivers in enqueue order.
#[derive(Clone)]
pub struct EmailOutbox {
    sender: mpsc::UnboundedSender<EmailNotification>,
    backlog: Arc<Backlog>,
}

impl EmailOutbox {
    /// Spawns the delivery worker on the current runtime.
    pub fn start(notifier: Arc<dyn OrderNotifier>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<EmailNotification>();
        let backlog = Arc::new(Backlog::default());

        let worker_backlog = backlog.clone();
        tokio::spawn(async move {
            while let Some(email) = receiver.recv().await {
                notify_best_effort(notifier.as_ref(), email).await;
                worker_backlog.queued.fetch_sub(1, Ordering::SeqCst);
                worker_backlog.drained.notify_waiters();
            }
            debug!("email outbox closed");
        });

        Self { sender, backlog }
    }

    pub fn dispatch(&self, email: EmailNotification) {
        self.backlog.queued.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(email)) = self.sender.send(email) {
            self.backlog.queued.fetch_sub(1, Ordering::SeqCst);
            warn!(order_id = %email.order_id, kind = %email.kind, "email outbox closed, dropping email");
        }
    }

    /// Emails enqueued but not yet handed to the notifier.
    pub fn pending(&self) -> usize {
        self.backlog.queued.load(Ordering::SeqCst)
    }

    /// Resolves once every enqueued email has been attempted.
    pub async fn idle(&self) {
        loop {
            let drained = self.backlog.drained.notified();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Posts messages as JSON to a transactional mail API.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
    store_name: String,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    template: EmailKind,
    variables: serde_json::Value,
}

impl HttpMailer {
    pub fn new(config: &MailerConfig, endpoint: String) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
            store_name: config.store_name.clone(),
        })
    }
}

#[async_trait]
impl OrderNotifier for HttpMailer {
    #[instrument(skip(self, email), fields(order_id = %email.order_id, kind = %email.kind))]
    async fn send(&self, email: EmailNotification) -> Result<(), NotificationError> {
        let message = OutgoingMessage {
            from: format!("{} <{}>", self.store_name, self.from_address),
            to: &email.to,
            subject: &email.subject,
            template: email.kind,
            variables: serde_json::to_value(&email)?,
        };

        let mut request = self
            .client
            .post(format!("{}/messages", self.endpoint.trim_end_matches('/')))
            .json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }
        info!("order email sent");
        Ok(())
    }
}

/// Logs instead of sending. Used when no mailer endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl OrderNotifier for LogMailer {
    async fn send(&self, email: EmailNotification) -> Result<(), NotificationError> {
        info!(
            order_id = %email.order_id,
            kind = %email.kind,
            to = %email.to,
            subject = %email.subject,
            "email (not sent, no mailer configured)"
        );
        Ok(())
    }
}

/// Picks the HTTP mailer when an endpoint is configured.
pub fn from_config(config: &MailerConfig) -> Result<Arc<dyn OrderNotifier>, NotificationError> {
    match config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(endpoint) => Ok(Arc::new(HttpMailer::new(config, endpoint.to_string())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
