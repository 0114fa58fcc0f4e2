use sea_orm::entity::prelude::*;
use sea_orm::Iterable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Order axis of the order lifecycle.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Payment axis of the order lifecycle.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// Fulfillment axis of the order lifecycle.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentStatus {
    #[sea_orm(string_value = "unfulfilled")]
    Unfulfilled,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

/// How the shopper pays. Decides the post-checkout route.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
    #[sea_orm(string_value = "mobile_transfer")]
    MobileTransfer,
    #[sea_orm(string_value = "card")]
    Card,
    #[sea_orm(string_value = "external_redirect")]
    ExternalRedirect,
}

impl PaymentMethod {
    /// Methods confirmed later by an uploaded proof of payment.
    pub fn requires_proof(&self) -> bool {
        matches!(self, PaymentMethod::BankTransfer | PaymentMethod::MobileTransfer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileTransfer => "mobile_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::ExternalRedirect => "external_redirect",
        }
    }
}

/// Review state of an uploaded proof of payment.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationStatus {
    #[sea_orm(string_value = "awaiting_proof")]
    AwaitingProof,
    #[sea_orm(string_value = "under_review")]
    UnderReview,
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Shared label dictionary. Admin and storefront pages both read from here.
pub trait StatusLabel: Copy {
    /// Stable machine value, identical to the stored column value.
    fn as_str(&self) -> &'static str;
    /// Human label for display.
    fn label(&self) -> &'static str;
}

impl StatusLabel for OrderStatus {
    fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Preparing => "Being prepared",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl StatusLabel for PaymentStatus {
    fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Awaiting payment",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Payment failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl StatusLabel for FulfillmentStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Unfulfilled => "unfulfilled",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FulfillmentStatus::Unfulfilled => "Not fulfilled",
            FulfillmentStatus::Processing => "Processing",
            FulfillmentStatus::Shipped => "Shipped",
            FulfillmentStatus::Delivered => "Delivered",
        }
    }
}

impl StatusLabel for VerificationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::AwaitingProof => "awaiting_proof",
            VerificationStatus::UnderReview => "under_review",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            VerificationStatus::AwaitingProof => "Waiting for proof of payment",
            VerificationStatus::UnderReview => "Proof under review",
            VerificationStatus::Verified => "Payment verified",
            VerificationStatus::Rejected => "Proof rejected",
        }
    }
}

/// One entry of the label dictionary as served to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LabelEntry {
    pub value: &'static str,
    pub label: &'static str,
}

/// Label dictionary for every axis.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusLabels {
    pub order_status: Vec<LabelEntry>,
    pub payment_status: Vec<LabelEntry>,
    pub fulfillment_status: Vec<LabelEntry>,
    pub verification_status: Vec<LabelEntry>,
}

fn entries<S>() -> Vec<LabelEntry>
where
    S: StatusLabel + Iterable,
{
    S::iter()
        .map(|s| LabelEntry {
            value: s.as_str(),
            label: s.label(),
        })
        .collect()
}

impl StatusLabels {
    pub fn dictionary() -> Self {
        Self {
            order_status: entries::<OrderStatus>(),
            payment_status: entries::<PaymentStatus>(),
            fulfillment_status: entries::<FulfillmentStatus>(),
            verification_status: entries::<VerificationStatus>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_values_match_serde_names() {
        for status in OrderStatus::iter() {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
        for status in PaymentStatus::iter() {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
        for status in FulfillmentStatus::iter() {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
    }

    #[test]
    fn machine_values_match_stored_values() {
        for status in OrderStatus::iter() {
            assert_eq!(status.to_value(), status.as_str());
        }
        for status in PaymentStatus::iter() {
            assert_eq!(status.to_value(), status.as_str());
        }
    }

    #[test]
    fn dictionary_covers_every_state() {
        let labels = StatusLabels::dictionary();
        assert_eq!(labels.order_status.len(), OrderStatus::iter().count());
        assert_eq!(labels.payment_status.len(), PaymentStatus::iter().count());
        assert_eq!(
            labels.fulfillment_status.len(),
            FulfillmentStatus::iter().count()
        );
        assert!(labels
            .order_status
            .iter()
            .any(|e| e.value == "preparing" && e.label == "Being prepared"));
    }

    #[test]
    fn proof_methods() {
        assert!(PaymentMethod::BankTransfer.requires_proof());
        assert!(PaymentMethod::MobileTransfer.requires_proof());
        assert!(!PaymentMethod::Card.requires_proof());
        assert!(!PaymentMethod::ExternalRedirect.requires_proof());
    }
}
