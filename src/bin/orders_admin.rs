use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use storefront_orders::{
    config::{self, AppConfig},
    db,
    events,
    notifications,
    services::{
        order_status::OrderStatusUpdateService, reconciliation::UnpaidOrderReconciler,
    },
};
use tracing::debug;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "orders-admin",
    about = "Maintenance commands for the storefront orders database",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending database migration
    Migrate,
    /// Cancel card orders whose payment never completed
    SweepUnpaid(SweepArgs),
}

#[derive(Args)]
struct SweepArgs {
    #[arg(
        long,
        help = "Override the configured age (minutes) after which unpaid card orders are cancelled"
    )]
    older_than_minutes: Option<i64>,
}

#[derive(Serialize)]
struct SweepReport {
    swept: usize,
    order_ids: Vec<Uuid>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(&config.log_level, config.log_json);

    match cli.command {
        Commands::Migrate => migrate(&config).await?,
        Commands::SweepUnpaid(args) => sweep_unpaid(&config, args, cli.json).await?,
    }

    Ok(())
}

async fn migrate(config: &AppConfig) -> Result<()> {
    let pool = db::establish_connection_from_app_config(config)
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn sweep_unpaid(config: &AppConfig, args: SweepArgs, json: bool) -> Result<()> {
    let pool = db::establish_connection_from_app_config(config)
        .await
        .context("failed to connect to database")?;
    let db = Arc::new(pool);

    let (event_sender, mut event_rx) = events::channel(config.event_channel_capacity);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(target: "orders_admin", event = event.name(), "received async event");
        }
    });

    let notifier = notifications::from_config(&config.mailer)
        .context("failed to build mailer client")?;
    let outbox = notifications::EmailOutbox::start(notifier);
    let status = Arc::new(OrderStatusUpdateService::new(
        db.clone(),
        event_sender.clone(),
        outbox.clone(),
    ));
    let stale_after = args
        .older_than_minutes
        .unwrap_or(config.checkout.stale_unpaid_after_minutes)
        .max(1);
    let reconciler = UnpaidOrderReconciler::new(db, status, event_sender, stale_after);

    let order_ids = reconciler
        .sweep(Utc::now())
        .await
        .context("unpaid order sweep failed")?;
    // The process exits next; deliver the cancellation emails first.
    outbox.idle().await;

    let report = SweepReport {
        swept: order_ids.len(),
        order_ids,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Cancelled {} unpaid card order(s) older than {} minute(s)",
            report.swept, stale_after
        );
        for id in &report.order_ids {
            println!("  {}", id);
        }
    }
    Ok(())
}
