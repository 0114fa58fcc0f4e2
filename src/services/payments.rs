use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::PaymentGatewayConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{CartLine, CheckoutForm, PaymentMethod},
    services::{
        checkout::CheckoutOrchestrator,
        order_status::OrderStatusUpdateService,
    },
};

/// One charge against a single-use card token.
#[derive(Clone, Serialize)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub token: String,
}

impl fmt::Debug for ChargeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChargeRequest")
            .field("order_id", &self.order_id)
            .field("order_number", &self.order_number)
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChargeReceipt {
    #[serde(alias = "id")]
    pub charge_id: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("card declined: {0}")]
    Declined(String),
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway unavailable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError>;
}

/// JSON charge API client: `POST {base_url}/charges` with a bearer key.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    #[serde(default, alias = "error")]
    message: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let body = json!({
            "amount": request.amount.round_dp(2).to_string(),
            "currency": request.currency,
            "source": request.token,
            "reference": request.order_number,
            "metadata": { "order_id": request.order_id },
        });

        let response = self
            .client
            .post(format!("{}/charges", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let receipt: ChargeReceipt = response.json().await?;
            if receipt.status.eq_ignore_ascii_case("succeeded") {
                return Ok(receipt);
            }
            return Err(GatewayError::Declined(format!(
                "charge {} ended with status '{}'",
                receipt.charge_id, receipt.status
            )));
        }

        let message = response
            .json::<GatewayErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("gateway returned {}", status));

        if status.is_client_error() {
            Err(GatewayError::Declined(message))
        } else {
            Err(GatewayError::Transport(message))
        }
    }
}

/// The card token and the form it was issued for.
#[derive(Clone, Deserialize, ToSchema)]
pub struct CardTokenSubmission {
    pub session_id: Uuid,
    pub items: Vec<CartLine>,
    pub form: CheckoutForm,
    pub token: String,
}

impl fmt::Debug for CardTokenSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardTokenSubmission")
            .field("session_id", &self.session_id)
            .field("items", &self.items.len())
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// A submission for this session was already in flight; nothing happened.
    Ignored,
    Paid {
        order_id: Uuid,
        order_number: String,
        view_token: String,
    },
}

/// Drives a card payment from token to paid order.
#[derive(Clone)]
pub struct PaymentProcessor {
    checkout: CheckoutOrchestrator,
    status: Arc<OrderStatusUpdateService>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    currency: String,
}

impl PaymentProcessor {
    pub fn new(
        checkout: CheckoutOrchestrator,
        status: Arc<OrderStatusUpdateService>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            checkout,
            status,
            gateway,
            event_sender,
            currency: currency.into(),
        }
    }

    /// Validates, re-checks stock, creates the card order and charges it.
    ///
    /// A second token arriving while the session's guard is held is dropped
    /// silently. A declined charge leaves the order pending and unpaid, keeps
    /// the cart, and discards the token; the shopper retries with a new one.
    #[instrument(skip(self, submission), fields(session_id = %submission.session_id))]
    pub async fn on_token_received(
        &self,
        submission: CardTokenSubmission,
    ) -> Result<PaymentOutcome, ServiceError> {
        let session = self.checkout.sessions().get_or_create(submission.session_id);
        let Some(_permit) = session.guard().try_permit() else {
            metrics::DUPLICATE_SUBMISSIONS.inc();
            info!("card token ignored, a submission is already in flight");
            return Ok(PaymentOutcome::Ignored);
        };

        let prepared = self.checkout.prepare(&submission.items, &submission.form)?;
        self.checkout.recheck_stock(&prepared).await?;
        self.checkout
            .publish_initiated(submission.session_id, &prepared, PaymentMethod::Card);

        let committed = self
            .checkout
            .commit(&prepared, PaymentMethod::Card, None)
            .await?;
        let order = committed.order;
        self.checkout.publish_order_created(&order);

        let request = ChargeRequest {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: order.total,
            currency: self.currency.clone(),
            token: submission.token,
        };

        let started = Instant::now();
        let charged = self.gateway.charge(request).await;
        let outcome = if charged.is_ok() { "succeeded" } else { "failed" };
        metrics::PAYMENT_CHARGES.with_label_values(&[outcome]).inc();
        metrics::PAYMENT_CHARGE_SECONDS
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        let receipt = match charged {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "card charge failed, order left unpaid");
                self.event_sender.publish(Event::PaymentFailed {
                    order_id: order.id,
                    reason: e.to_string(),
                });
                return Err(ServiceError::PaymentFailed(e.to_string()));
            }
        };

        let paid = match self
            .status
            .record_card_capture(order.id, receipt.charge_id.clone())
            .await
        {
            Ok(paid) => paid,
            Err(e) => {
                error!(
                    order_id = %order.id,
                    charge_id = %receipt.charge_id,
                    error = %e,
                    "charge captured but order could not be marked paid"
                );
                // Keep the reference on the order so the unpaid sweep leaves it alone.
                if let Err(attach) = self
                    .status
                    .attach_charge_id(order.id, &receipt.charge_id)
                    .await
                {
                    error!(order_id = %order.id, error = %attach, "failed to store charge reference");
                }
                self.event_sender.publish(Event::PaymentCapturedUnrecorded {
                    order_id: order.id,
                    charge_id: receipt.charge_id,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.event_sender.publish(Event::PaymentCaptured {
            order_id: paid.id,
            amount: paid.total,
            charge_id: receipt.charge_id,
        });
        self.checkout
            .sessions()
            .clear_after_order(submission.session_id);

        Ok(PaymentOutcome::Paid {
            order_id: paid.id,
            order_number: paid.order_number,
            view_token: paid.view_token,
        })
    }
}
