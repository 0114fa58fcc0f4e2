//! Storefront Orders
//!
//! Order lifecycle state machine plus checkout and payment orchestration for a
//! storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the services on top of an open pool and a running event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        notifier: Arc<dyn notifications::OrderNotifier>,
        gateway: Arc<dyn services::payments::PaymentGateway>,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            &config,
            event_sender.clone(),
            notifier,
            gateway,
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` route.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::checkout::checkout_routes())
        .merge(handlers::storefront::storefront_routes())
        .merge(handlers::admin_orders::admin_order_routes())
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_production() {
        ::tracing::warn!("no CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    }
}

/// Full application router with the HTTP middleware stack. `access_log`
/// receives one line per request.
pub fn app_router(state: AppState, access_log: slog::Logger) -> Router {
    let logging_state = Arc::new(logging::LoggingState::new(access_log));
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));
    let cors = cors_layer(&state.config);

    Router::<AppState>::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(axum::middleware::from_fn_with_state(
            logging_state,
            logging::logging_middleware,
        ))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}
