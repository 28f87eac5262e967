//! Development server for UI work
//!
//! Starts the API against a fresh database filled with courts, players,
//! bookings and a block, then keeps the mocked clock in step with real time
//! and runs the scheduler so reminders and auto-cancellation happen as they
//! would in production. Sign in through `/api/test_login`.
//!
//! Usage: cargo run -p dev-server

use anyhow::Result;
use api::scheduler::Scheduler;
use jiff::Timestamp;
use std::time::Duration;
use test_helpers::mock::DevDataset;
use tokio::time::interval;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = api::telemetry::get_subscriber("info".into());
    api::telemetry::init_subscriber(subscriber);

    let _ = dotenvy::dotenv();
    info!("Starting court booking development server");

    let app = test_helpers::spawn_app().await;

    info!("Setting up development data");
    let dataset = DevDataset::create(&app).await?;

    start_time_sync_task(&app);
    start_scheduler_task(&app);

    info!("Development server ready on http://127.0.0.1:{}", app.port);
    dataset.print_summary();
    info!("");
    info!("Press Ctrl+C to shut down");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down development server");
    Ok(())
}

/// Keep the mocked clock in step with real time.
fn start_time_sync_task(app: &test_helpers::TestApp) {
    let time_source = app.time_source.clone();

    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            time_source.set(Timestamp::now());
        }
    });
}

/// Sweep for reminders and auto-cancellations the way the api binary does.
fn start_scheduler_task(app: &test_helpers::TestApp) {
    let scheduler = Scheduler::new(
        app.db_pool.clone(),
        app.time_source.clone(),
        app.email_service.clone(),
        app.venue.clone(),
        Duration::from_secs(10),
    );
    tokio::spawn(async move {
        scheduler.run().await;
    });
}
