use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::order::PaymentMethod;

/// A cart line as submitted by the storefront. Name, price and image are frozen
/// into the order item snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub name: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub dni: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AddressInfo {
    pub line: String,
    #[serde(default)]
    pub district_code: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Client-side shipping choice. Only `rate_id` is trusted; the rest is re-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShippingSelection {
    pub rate_id: String,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub estimated_days: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    Percentage,
    Fixed,
    FreeShipping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CouponInfo {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<CouponKind>,
    #[serde(default)]
    pub discount: Option<Decimal>,
}

/// Everything the shopper filled in on the checkout page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutForm {
    pub customer: CustomerInfo,
    pub address: AddressInfo,
    #[serde(default)]
    pub shipping: Option<ShippingSelection>,
    #[serde(default)]
    pub coupon: Option<CouponInfo>,
    #[serde(default)]
    pub terms_accepted: bool,
}

/// Form field a validation error points at, so the UI can focus it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutField {
    Cart,
    District,
    ShippingRate,
    Terms,
    Name,
    Email,
    Phone,
    Address,
}

/// Where the storefront should send the shopper after a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutRoute {
    UploadProof { order_id: Uuid, view_token: String },
    Redirect { url: String },
    AwaitCardToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutOutcome {
    pub order_id: Option<Uuid>,
    pub order_number: Option<String>,
    pub payment_method: PaymentMethod,
    pub route: CheckoutRoute,
}

/// Order totals, always derived server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}
