use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};

use crate::{
    handlers::AppState,
    models::StatusLabels,
    services::order_lookup::{LookupRequest, OrderView, PaymentProofSubmission},
    ApiResponse, ApiResult,
};

/// Human-readable labels for every status on every axis
#[utoipa::path(
    get,
    path = "/api/v1/status-labels",
    responses((status = 200, description = "Label dictionary", body = ApiResponse<StatusLabels>)),
    tag = "Storefront"
)]
pub async fn status_labels() -> Json<ApiResponse<StatusLabels>> {
    Json(ApiResponse::success(StatusLabels::dictionary()))
}

/// Find an order by its view token and the buyer's email
#[utoipa::path(
    post,
    path = "/api/v1/orders/lookup",
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderView>),
        (status = 404, description = "No order for this token and email", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
pub async fn lookup_order(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> ApiResult<OrderView> {
    let view = state.services.lookup.lookup(request).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Attach a proof of payment to a bank or mobile transfer order
#[utoipa::path(
    post,
    path = "/api/v1/orders/lookup/payment-proof",
    request_body = PaymentProofSubmission,
    responses(
        (status = 200, description = "Proof queued for review", body = ApiResponse<OrderView>),
        (status = 400, description = "Order does not accept a proof now", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order for this token and email", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
pub async fn submit_payment_proof(
    State(state): State<AppState>,
    Json(request): Json<PaymentProofSubmission>,
) -> ApiResult<OrderView> {
    let view = state.services.lookup.submit_payment_proof(request).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Storefront routes, nested under `/api/v1`
pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/status-labels", get(status_labels))
        .route("/orders/lookup", post(lookup_order))
        .route("/orders/lookup/payment-proof", post(submit_payment_proof))
}
