use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::AppState,
    models::{CartLine, CheckoutForm, CheckoutOutcome, PaymentMethod},
    services::{
        checkout::CheckoutSubmission,
        payments::{CardTokenSubmission, PaymentOutcome},
        stock::StockCheck,
    },
    ApiResponse,
};

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Cart and saved form for one checkout session
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    pub items: Vec<CartLine>,
    pub draft: Option<CheckoutForm>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceCartRequest {
    pub items: Vec<CartLine>,
}

/// The checkout form plus how the shopper wants to pay.
#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({
    "customer": {"name": "Ana Quispe", "email": "ana@example.com", "phone": "987654321"},
    "address": {"line": "Av. Arequipa 1234, Lince", "district_code": "150116"},
    "shipping": {"rate_id": "lima-standard"},
    "coupon": {"code": "HOLA10", "type": "percentage", "discount": "10"},
    "terms_accepted": true,
    "payment_method": "bank_transfer",
    "idempotency_key": "c3b1f0d2-checkout-1"
}))]
pub struct SubmitCheckoutRequest {
    #[serde(flatten)]
    pub form: CheckoutForm,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// The checkout form plus the single-use card token from the payment widget.
#[derive(Deserialize, ToSchema)]
pub struct CardTokenRequest {
    #[serde(flatten)]
    pub form: CheckoutForm,
    pub token: String,
}

/// Unknown sessions read as empty without being created.
fn session_view(state: &AppState, session_id: Uuid) -> SessionView {
    match state.services.sessions.get(session_id) {
        Some(session) => SessionView {
            session_id,
            items: session.cart(),
            draft: session.draft(),
        },
        None => SessionView {
            session_id,
            items: Vec::new(),
            draft: None,
        },
    }
}

fn session_cart(state: &AppState, session_id: Uuid) -> Vec<CartLine> {
    state
        .services
        .sessions
        .get(session_id)
        .map(|s| s.cart())
        .unwrap_or_default()
}

/// Body key wins over the `Idempotency-Key` header.
fn idempotency_key(body: Option<String>, headers: &HeaderMap) -> Option<String> {
    body.or_else(|| {
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
    .map(|k| k.trim().to_string())
    .filter(|k| !k.is_empty())
}

/// Current cart and draft
#[utoipa::path(
    get,
    path = "/api/v1/checkout/sessions/{session_id}/cart",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    responses((status = 200, description = "Session contents", body = ApiResponse<SessionView>)),
    tag = "Checkout"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<ApiResponse<SessionView>> {
    Json(ApiResponse::success(session_view(&state, session_id)))
}

/// Replace the cart lines
#[utoipa::path(
    put,
    path = "/api/v1/checkout/sessions/{session_id}/cart",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    request_body = ReplaceCartRequest,
    responses((status = 200, description = "Cart replaced", body = ApiResponse<SessionView>)),
    tag = "Checkout"
)]
pub async fn replace_cart(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ReplaceCartRequest>,
) -> Json<ApiResponse<SessionView>> {
    state.services.sessions.replace_cart(session_id, request.items);
    Json(ApiResponse::success(session_view(&state, session_id)))
}

/// Save the half-filled form so it survives a reload
#[utoipa::path(
    put,
    path = "/api/v1/checkout/sessions/{session_id}/draft",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    request_body = CheckoutForm,
    responses((status = 200, description = "Draft saved", body = ApiResponse<SessionView>)),
    tag = "Checkout"
)]
pub async fn save_draft(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(form): Json<CheckoutForm>,
) -> Json<ApiResponse<SessionView>> {
    state.services.sessions.save_draft(session_id, form);
    Json(ApiResponse::success(session_view(&state, session_id)))
}

/// Advisory stock check for the session's cart; nothing is reserved
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions/{session_id}/availability",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Availability of every cart line", body = ApiResponse<StockCheck>),
        (status = 500, description = "Internal error", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn check_availability(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<StockCheck>>, ServiceError> {
    let check = state.services.checkout.check_availability(session_id).await?;
    Ok(Json(ApiResponse::success(check)))
}

/// Submit the checkout for the session's cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions/{session_id}/submit",
    params(
        ("session_id" = Uuid, Path, description = "Checkout session id"),
        ("Idempotency-Key" = Option<String>, Header, description = "Retry-safe submission key")
    ),
    request_body = SubmitCheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CheckoutOutcome>),
        (status = 200, description = "Card payment: send the card token next", body = ApiResponse<CheckoutOutcome>),
        (status = 400, description = "A form field is invalid", body = crate::errors::ErrorResponse),
        (status = 409, description = "Out of stock or submission already in flight", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn submit_checkout(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<SubmitCheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutOutcome>>), ServiceError> {
    let submission = CheckoutSubmission {
        session_id,
        items: session_cart(&state, session_id),
        form: request.form,
        payment_method: request.payment_method,
        idempotency_key: idempotency_key(request.idempotency_key, &headers),
    };

    let outcome = state.services.checkout.submit(submission).await?;
    let status = if outcome.order_id.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(outcome))))
}

/// Create the card order and charge the token
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions/{session_id}/card-token",
    params(("session_id" = Uuid, Path, description = "Checkout session id")),
    request_body = CardTokenRequest,
    responses(
        (status = 200, description = "Paid, or ignored as a duplicate", body = ApiResponse<PaymentOutcome>),
        (status = 402, description = "Charge declined; retry with a new token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Out of stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn submit_card_token(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CardTokenRequest>,
) -> Result<Json<ApiResponse<PaymentOutcome>>, ServiceError> {
    if request.token.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "card token is required".to_string(),
        ));
    }

    let submission = CardTokenSubmission {
        session_id,
        items: session_cart(&state, session_id),
        form: request.form,
        token: request.token,
    };
    let outcome = state.services.payments.on_token_received(submission).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Checkout routes, nested under `/api/v1`
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout/sessions/:session_id/cart",
            get(get_cart).put(replace_cart),
        )
        .route("/checkout/sessions/:session_id/draft", put(save_draft))
        .route(
            "/checkout/sessions/:session_id/availability",
            post(check_availability),
        )
        .route("/checkout/sessions/:session_id/submit", post(submit_checkout))
        .route(
            "/checkout/sessions/:session_id/card-token",
            post(submit_card_token),
        )
}
