use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use storefront_orders as api;

const EMAIL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::metrics::register_metrics();

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    tokio::spawn(api::events::process_events(event_rx));

    // Outbound integrations
    let notifier = api::notifications::from_config(&cfg.mailer)
        .context("failed to build mailer client")?;
    let gateway: Arc<dyn api::services::payments::PaymentGateway> = Arc::new(
        api::services::payments::HttpPaymentGateway::new(&cfg.payment_gateway)
            .context("failed to build payment gateway client")?,
    );

    // Compose shared app state
    let app_state = api::AppState::new(
        db_arc.clone(),
        cfg.clone(),
        event_sender,
        notifier,
        gateway,
    );

    if cfg.checkout.sweep_interval_secs > 0 {
        let reconciler = app_state.services.reconciler.as_ref().clone();
        reconciler.spawn(Duration::from_secs(cfg.checkout.sweep_interval_secs));
        info!(
            interval_secs = cfg.checkout.sweep_interval_secs,
            stale_after_minutes = cfg.checkout.stale_unpaid_after_minutes,
            "unpaid order sweep scheduled"
        );
        app_state.services.sessions.clone().spawn_eviction(
            Duration::from_secs(cfg.checkout.sweep_interval_secs),
            chrono::Duration::minutes(cfg.checkout.session_idle_minutes),
        );
    }
    let outbox = app_state.services.outbox.clone();

    let access_log = api::logging::setup_logger(api::logging::LoggerConfig {
        use_color: !cfg.log_json,
        ..Default::default()
    });
    let app = api::app_router(app_state, access_log);

    // Bind and serve
    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address '{}'", cfg.host))?;
    let addr = SocketAddr::from((host, cfg.port));
    info!("storefront-orders listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if tokio::time::timeout(EMAIL_DRAIN_TIMEOUT, outbox.idle())
        .await
        .is_err()
    {
        warn!(pending = outbox.pending(), "shutting down with undelivered emails");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
