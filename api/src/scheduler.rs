//! Time-based transitions, driven by a periodic sweep.
//!
//! Each tick re-reads persisted state; nothing is scheduled in memory. Two
//! passes run every tick:
//!
//! ```text
//!   start - 65m        start - 55m          start - 5m      start
//!        |-- reminder window --|                  |            |
//!        confirmed: remind once                   |            |
//!        pending:   "still pending" every tick    |            |
//!                                                 |-- cutoff --|
//!                                  pending bookings become auto_cancelled
//! ```
//!
//! Rows are claimed with `FOR UPDATE SKIP LOCKED`, each in its own
//! transaction, so several scheduler instances can sweep concurrently
//! without double-processing a booking.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jiff::{SignedDuration, Timestamp};
use jiff_sqlx::ToSqlx;
use payloads::{BookingId, ParticipantStatus, responses};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::time;
use uuid::Uuid;

use crate::{
    email::{self, EmailService},
    store::{Venue, booking},
    telemetry::log_error,
    time::TimeSource,
};

/// Reminders go out for bookings starting between these offsets from now.
pub const REMINDER_WINDOW_START: SignedDuration = SignedDuration::from_mins(55);
pub const REMINDER_WINDOW_END: SignedDuration = SignedDuration::from_mins(65);
/// Bookings still pending this close to their start are auto-cancelled.
pub const CONFIRMATION_CUTOFF: SignedDuration = SignedDuration::from_mins(5);
/// An auto-cancelled slot is advertised from shortly before it starts until
/// shortly before it ends.
const AUTO_CANCEL_BANNER_LEAD: SignedDuration = SignedDuration::from_mins(5);
const AUTO_CANCEL_BANNER_TAIL: SignedDuration = SignedDuration::from_mins(10);
pub const AUTO_CANCEL_REASON: &str = "Cutoff auto-cancel";

pub struct Scheduler {
    pool: PgPool,
    time_source: TimeSource,
    email_service: Arc<EmailService>,
    venue: Venue,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        time_source: TimeSource,
        email_service: Arc<EmailService>,
        venue: Venue,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            time_source,
            email_service,
            venue,
            tick_interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let _ = schedule_tick(
                &self.pool,
                &self.time_source,
                &self.email_service,
                &self.venue,
            )
            .await
            .map_err(log_error);
        }
    }
}

/// Update state once right now.
///
/// A failing pass is logged and does not stop the other one.
#[tracing::instrument(skip_all)]
pub async fn schedule_tick(
    pool: &PgPool,
    time_source: &TimeSource,
    email_service: &EmailService,
    venue: &Venue,
) -> anyhow::Result<()> {
    let _ = send_reminders(pool, time_source, email_service, venue)
        .await
        .map_err(log_error);
    let _ = auto_cancel_unconfirmed(pool, time_source, email_service, venue)
        .await
        .map_err(log_error);
    Ok(())
}

/// Remind confirmed bookings once, and nudge pending ones every tick.
#[tracing::instrument(skip_all)]
async fn send_reminders(
    pool: &PgPool,
    time_source: &TimeSource,
    email_service: &EmailService,
    venue: &Venue,
) -> anyhow::Result<()> {
    let now = time_source.now();
    let from = now + REMINDER_WINDOW_START;
    let to = now + REMINDER_WINDOW_END;

    // bookings whose reminder failed for everyone stay unflagged; skip them
    // for the rest of this tick so the next tick retries
    let mut attempted = Vec::new();
    loop {
        let next = remind_next_confirmed(
            &attempted,
            from,
            to,
            pool,
            email_service,
            venue,
        )
        .await;
        match next {
            Ok(Some(booking_id)) => attempted.push(booking_id.0),
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to send reminder: {e:#}");
                break;
            }
        }
    }

    let pending = sqlx::query_as::<_, responses::Booking>(&format!(
        "{} WHERE b.status = 'pending'
            AND b.start_at >= $1
            AND b.start_at < $2
        ORDER BY b.start_at",
        booking::BOOKING_SELECT
    ))
    .bind(from.to_sqlx())
    .bind(to.to_sqlx())
    .fetch_all(pool)
    .await
    .context("Failed to list pending bookings for notice")?;
    for pending_booking in pending {
        let recipients =
            participant_emails(&pending_booking.id, None, pool).await?;
        let template = email::still_pending_notice(
            &pending_booking.court_name,
            &venue.local(pending_booking.start_at),
        );
        email_service.send_to_each(&recipients, &template).await;
    }
    Ok(())
}

/// Claim one confirmed booking due a reminder and notify its confirmed
/// players. Returns the booking handled, if any.
#[tracing::instrument(skip_all)]
async fn remind_next_confirmed(
    attempted: &[Uuid],
    from: Timestamp,
    to: Timestamp,
    pool: &PgPool,
    email_service: &EmailService,
    venue: &Venue,
) -> anyhow::Result<Option<BookingId>> {
    let mut tx = pool.begin().await?;
    let Some(due) = sqlx::query_as::<_, responses::Booking>(&format!(
        "{} WHERE b.status = 'confirmed'
            AND NOT b.reminder_sent
            AND b.start_at >= $1
            AND b.start_at < $2
            AND b.id <> ALL($3)
        ORDER BY b.start_at
        LIMIT 1
        FOR UPDATE OF b SKIP LOCKED",
        booking::BOOKING_SELECT
    ))
    .bind(from.to_sqlx())
    .bind(to.to_sqlx())
    .bind(attempted)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(None);
    };

    let recipients = participant_emails(
        &due.id,
        Some(ParticipantStatus::Confirmed),
        &mut *tx,
    )
    .await?;
    let template =
        email::booking_reminder(&due.court_name, &venue.local(due.start_at));
    let report = email_service.send_to_each(&recipients, &template).await;

    if report.delivered > 0 {
        sqlx::query(
            "UPDATE bookings SET reminder_sent = true
            WHERE id = $1 AND NOT reminder_sent",
        )
        .bind(due.id)
        .execute(&mut *tx)
        .await?;
    } else {
        tracing::warn!(booking_id = %due.id, "No reminder delivered");
    }
    tx.commit().await?;
    Ok(Some(due.id))
}

/// Auto-cancel every pending booking that has reached its confirmation
/// cutoff.
#[tracing::instrument(skip_all)]
async fn auto_cancel_unconfirmed(
    pool: &PgPool,
    time_source: &TimeSource,
    email_service: &EmailService,
    venue: &Venue,
) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    loop {
        let next =
            auto_cancel_next(&failed, pool, time_source, email_service, venue)
                .await;
        match next {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err((booking_id, e)) => {
                tracing::error!("Failed to auto-cancel booking: {e:#}");
                match booking_id {
                    Some(booking_id) => failed.push(booking_id.0),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

/// Claim the next pending booking past its cutoff and auto-cancel it.
///
/// Only the players who never confirmed are told.
async fn auto_cancel_next(
    skip: &[Uuid],
    pool: &PgPool,
    time_source: &TimeSource,
    email_service: &EmailService,
    venue: &Venue,
) -> Result<Option<BookingId>, (Option<BookingId>, anyhow::Error)> {
    let now = time_source.now();
    let mut tx = pool.begin().await.map_err(|e| (None, e.into()))?;
    let due = sqlx::query_as::<_, responses::Booking>(&format!(
        "{} WHERE b.status = 'pending'
            AND b.start_at <= $1
            AND b.id <> ALL($2)
        ORDER BY b.start_at
        LIMIT 1
        FOR UPDATE OF b SKIP LOCKED",
        booking::BOOKING_SELECT
    ))
    .bind((now + CONFIRMATION_CUTOFF).to_sqlx())
    .bind(skip)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| (None, e.into()))?;
    let Some(due) = due else {
        return Ok(None);
    };

    let pending = cancel_locked(&due, now, &mut tx)
        .await
        .map_err(|e| (Some(due.id), e))?;
    let Some(pending) = pending else {
        // another writer moved it on first
        return Ok(Some(due.id));
    };
    tx.commit().await.map_err(|e| (Some(due.id), e.into()))?;
    tracing::info!(booking_id = %due.id, "Booking auto-cancelled");

    let template =
        email::auto_cancelled(&due.court_name, &venue.local(due.start_at));
    email_service.send_to_each(&pending, &template).await;
    Ok(Some(due.id))
}

/// Flip a locked pending booking to auto_cancelled and log the freed slot.
/// Returns the players still pending, or `None` if the booking was no
/// longer pending.
async fn cancel_locked(
    due: &responses::Booking,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> anyhow::Result<Option<Vec<String>>> {
    let pending = participant_emails(
        &due.id,
        Some(ParticipantStatus::Pending),
        &mut **tx,
    )
    .await?;
    let result = sqlx::query(
        "UPDATE bookings SET status = 'auto_cancelled', updated_at = $2
        WHERE id = $1 AND status = 'pending'",
    )
    .bind(due.id)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    booking::record_cancellation_tx(
        Some(due),
        due.start_at - AUTO_CANCEL_BANNER_LEAD,
        due.end_at - AUTO_CANCEL_BANNER_TAIL,
        AUTO_CANCEL_REASON,
        now,
        tx,
    )
    .await?;
    Ok(Some(pending))
}

/// Participant addresses of a booking, optionally only those with the given
/// participant status.
async fn participant_emails<'e, E>(
    booking_id: &BookingId,
    status: Option<ParticipantStatus>,
    executor: E,
) -> anyhow::Result<Vec<String>>
where
    E: sqlx::PgExecutor<'e>,
{
    let emails = sqlx::query_scalar::<_, String>(
        "SELECT email FROM booking_participants
        WHERE booking_id = $1
            AND ($2::participant_status IS NULL OR status = $2)
        ORDER BY email",
    )
    .bind(booking_id)
    .bind(status)
    .fetch_all(executor)
    .await?;
    Ok(emails)
}
