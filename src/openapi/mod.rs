use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Orders API",
        version = "0.1.0",
        description = r#"
# Storefront Orders API

Checkout, payment and the order lifecycle behind the storefront.

Every order moves on three independent axes:

- **Order status**: pending, confirmed, preparing, shipped, delivered, cancelled
- **Payment status**: pending, paid, failed, refunded
- **Fulfillment status**: unfulfilled, processing, shipped, delivered

Transitions outside the allowed set are rejected with `409` and leave the order untouched.

## Error Handling

Errors share one body. Field validation errors name the form field to focus:

```json
{
  "error": "Bad Request",
  "message": "Please enter a valid email address",
  "field": "email",
  "request_id": "req-abc123xyz",
  "timestamp": "2025-03-01T10:30:00Z"
}
```

Admin endpoints are expected behind an authenticating gateway.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart, draft and order submission"),
        (name = "Storefront", description = "Customer order lookup and payment proofs"),
        (name = "Admin Orders", description = "Order status management"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Checkout
        crate::handlers::checkout::get_cart,
        crate::handlers::checkout::replace_cart,
        crate::handlers::checkout::save_draft,
        crate::handlers::checkout::check_availability,
        crate::handlers::checkout::submit_checkout,
        crate::handlers::checkout::submit_card_token,

        // Storefront
        crate::handlers::storefront::status_labels,
        crate::handlers::storefront::lookup_order,
        crate::handlers::storefront::submit_payment_proof,

        // Admin
        crate::handlers::admin_orders::get_order,
        crate::handlers::admin_orders::update_order,
        crate::handlers::admin_orders::cancel_order,
        crate::handlers::admin_orders::refund_order,
        crate::handlers::admin_orders::mark_payment_failed,
        crate::handlers::admin_orders::review_payment_proof,

        crate::handlers::health::health,
    ),
    components(
        schemas(
            // Checkout types
            crate::models::CartLine,
            crate::models::CheckoutForm,
            crate::models::CustomerInfo,
            crate::models::AddressInfo,
            crate::models::ShippingSelection,
            crate::models::CouponInfo,
            crate::models::CouponKind,
            crate::models::CheckoutField,
            crate::models::CheckoutOutcome,
            crate::models::CheckoutRoute,
            crate::models::OrderTotals,
            crate::handlers::checkout::SessionView,
            crate::handlers::checkout::ReplaceCartRequest,
            crate::handlers::checkout::SubmitCheckoutRequest,
            crate::handlers::checkout::CardTokenRequest,
            crate::services::stock::StockCheck,
            crate::services::stock::UnavailableItem,
            crate::services::payments::PaymentOutcome,

            // Order types
            crate::models::OrderStatus,
            crate::models::PaymentStatus,
            crate::models::FulfillmentStatus,
            crate::models::PaymentMethod,
            crate::models::VerificationStatus,
            crate::models::StatusLabels,
            crate::services::order_lookup::OrderView,
            crate::services::order_lookup::OrderItemView,
            crate::services::order_lookup::PendingPaymentView,
            crate::services::order_lookup::StatusView,
            crate::services::order_lookup::LookupRequest,
            crate::services::order_lookup::PaymentProofSubmission,
            crate::services::order_lookup::PaymentProofReview,
            crate::services::order_status::OrderStatusUpdate,
            crate::handlers::admin_orders::AdminActionRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
