use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::{
        order_lookup::{OrderView, PaymentProofReview},
        order_status::OrderStatusUpdate,
    },
    ApiResponse, ApiResult,
};

/// Optional note for the named admin actions. Without one the action's
/// default note is recorded.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct AdminActionRequest {
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
}

fn action_note(body: Option<Json<AdminActionRequest>>) -> Result<Option<String>, ServiceError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    request.validate()?;
    Ok(request.admin_notes)
}

/// Full order with items and payment proof
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let view = state.services.lookup.get(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Change any combination of axes, tracking and notes in one step
#[utoipa::path(
    patch,
    path = "/api/v1/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = OrderStatusUpdate,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed or order changed concurrently", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin Orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<OrderStatusUpdate>,
) -> ApiResult<OrderView> {
    state.services.order_status.apply(id, update).await?;
    let view = state.services.lookup.get(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Cancel the order and put its items back in stock
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = AdminActionRequest, description = "Optional note"),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderView>),
        (status = 409, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<AdminActionRequest>>,
) -> ApiResult<OrderView> {
    state.services.order_status.cancel(id, action_note(body)?).await?;
    let view = state.services.lookup.get(id).await?;
    Ok(Json(ApiResponse::success(view).with_message("Order cancelled")))
}

/// Mark a paid order refunded
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/refund",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = AdminActionRequest, description = "Optional note"),
    responses(
        (status = 200, description = "Payment refunded", body = ApiResponse<OrderView>),
        (status = 409, description = "Only paid orders can be refunded", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin Orders"
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<AdminActionRequest>>,
) -> ApiResult<OrderView> {
    state.services.order_status.refund(id, action_note(body)?).await?;
    let view = state.services.lookup.get(id).await?;
    Ok(Json(ApiResponse::success(view).with_message("Payment refunded")))
}

/// Mark a pending payment as failed
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/mark-failed",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = AdminActionRequest, description = "Optional note"),
    responses(
        (status = 200, description = "Payment marked failed", body = ApiResponse<OrderView>),
        (status = 409, description = "Only pending payments can be failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin Orders"
)]
pub async fn mark_payment_failed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<AdminActionRequest>>,
) -> ApiResult<OrderView> {
    state
        .services
        .order_status
        .mark_payment_failed(id, action_note(body)?)
        .await?;
    let view = state.services.lookup.get(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Approve or reject an uploaded proof of payment
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/payment-proof/review",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = PaymentProofReview,
    responses(
        (status = 200, description = "Proof reviewed", body = ApiResponse<OrderView>),
        (status = 400, description = "No proof under review", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order has no proof", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin Orders"
)]
pub async fn review_payment_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(review): Json<PaymentProofReview>,
) -> ApiResult<OrderView> {
    let view = state.services.lookup.review_payment_proof(id, review).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Admin order routes, nested under `/api/v1`. Authentication happens at the
/// admin gateway in front of this service.
pub fn admin_order_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/orders/:id", get(get_order).patch(update_order))
        .route("/admin/orders/:id/cancel", post(cancel_order))
        .route("/admin/orders/:id/refund", post(refund_order))
        .route("/admin/orders/:id/mark-failed", post(mark_payment_failed))
        .route(
            "/admin/orders/:id/payment-proof/review",
            post(review_payment_proof),
        )
}
