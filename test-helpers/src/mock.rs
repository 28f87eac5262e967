//! Development data set.
//!
//! Used by the dev-server to give the UI something to show:
//! - three courts, one of them blocked for tomorrow evening
//! - the regular test players and an administrator
//! - a confirmed booking and a pending one for tomorrow morning

use crate::{ALICE, BOB, CHARLIE, DAVE, TestApp};
use anyhow::Result;
use jiff::Timestamp;
use payloads::{Lot, requests, responses};

pub struct DevDataset {
    pub courts: Vec<responses::Court>,
    pub confirmed_booking: responses::CreatedBooking,
    pub pending_booking: responses::CreatedBooking,
    pub block: responses::BlockCreationResult,
}

impl DevDataset {
    pub async fn create(app: &TestApp) -> Result<Self> {
        app.set_time(Timestamp::now());

        tracing::info!("Creating courts");
        let mut courts = Vec::new();
        for name in ["Court 1", "Court 2", "Court 3"] {
            courts.push(app.create_court(name).await?);
        }

        tracing::info!("Creating players and an administrator");
        app.create_players().await?;
        app.create_admin().await?;

        let tomorrow = app.today().tomorrow()?;

        tracing::info!("Creating bookings for tomorrow morning");
        app.login_alice().await?;
        let confirmed_booking = app
            .book(courts[0].id, app.at(tomorrow, 6, 0), 30, &[BOB])
            .await?;
        app.confirm_all(&[BOB]).await?;

        app.login(CHARLIE).await?;
        let pending_booking = app
            .book(courts[1].id, app.at(tomorrow, 7, 0), 30, &[DAVE])
            .await?;

        tracing::info!("Blocking the last court tomorrow evening");
        app.login_admin().await?;
        let block = app
            .client
            .create_blocks(&requests::CreateBlocks {
                court_ids: vec![courts[2].id],
                lots: vec![Lot::Evening],
                start_date: tomorrow,
                end_date: tomorrow,
                reason: Some("Maintenance".into()),
            })
            .await?;

        app.login_alice().await?;
        Ok(Self {
            courts,
            confirmed_booking,
            pending_booking,
            block,
        })
    }

    pub fn print_summary(&self) {
        tracing::info!("Courts:");
        for court in &self.courts {
            tracing::info!("   {} ({})", court.name, court.id);
        }
        tracing::info!(
            "Confirmed booking {} on {}",
            self.confirmed_booking.booking.id,
            self.confirmed_booking.booking.court_name
        );
        tracing::info!(
            "Pending booking {} on {}",
            self.pending_booking.booking.id,
            self.pending_booking.booking.court_name
        );
        tracing::info!("Blocks created: {}", self.block.created.len());
        tracing::info!("Sign in with POST /api/test_login as {ALICE}");
    }
}
