//! Administrative blackout blocks.
//!
//! A block closes one lot of one court over an inclusive date range. Creating
//! it cancels every active booking it covers that has not started yet; games
//! already under way or played are left alone. Overlapping blocks for the same
//! court and lot are refused; concurrent creations for one court serialize on
//! a lock of the court row.

use jiff_sqlx::ToSqlx;
use payloads::{
    BlockId, BookingStatus, CourtId, Lot, UserId, requests, responses,
};
use sqlx::{PgPool, Postgres, Transaction};

use super::{StoreError, Venue, admin, booking};
use crate::time::TimeSource;

/// Blocks may end at most this many days after today, and span at most this
/// many days.
pub const BLOCK_HORIZON_DAYS: i32 = 30;

#[derive(Debug, Clone)]
pub struct BlockCreation {
    pub result: responses::BlockCreationResult,
    /// Bookings cancelled by the new blocks, to be notified.
    pub cancelled: Vec<booking::CancelledBooking>,
}

/// The block reason as stored, and the reason recorded on each booking it
/// cancels.
fn reasons(reason: Option<&str>) -> (Option<String>, String) {
    let reason = reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);
    let cascade = format!(
        "Blocked: {}",
        reason.as_deref().unwrap_or("court unavailable")
    );
    (reason, cascade)
}

fn validate(
    details: &requests::CreateBlocks,
    today: jiff::civil::Date,
) -> Result<(), StoreError> {
    if details.court_ids.is_empty() || details.lots.is_empty() {
        return Err(StoreError::EmptyBlockSelection);
    }
    if details.start_date > details.end_date {
        return Err(StoreError::InvalidBlockRange);
    }
    if details.start_date < today {
        return Err(StoreError::BlockInPast);
    }
    if (details.end_date - today).get_days() > BLOCK_HORIZON_DAYS
        || (details.end_date - details.start_date).get_days()
            > BLOCK_HORIZON_DAYS
    {
        return Err(StoreError::BlockOutsideHorizon);
    }
    if details
        .reason
        .as_ref()
        .is_some_and(|r| r.len() > requests::BLOCK_REASON_MAX_LEN)
    {
        return Err(StoreError::FieldTooLong);
    }
    Ok(())
}

/// Create one block per (court, lot) pair of the request and cancel the
/// bookings they cover, all in one transaction.
#[tracing::instrument(skip(details, venue, pool, time_source))]
pub async fn create_blocks(
    details: &requests::CreateBlocks,
    admin_id: &UserId,
    venue: &Venue,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<BlockCreation, StoreError> {
    admin::require_admin(admin_id, pool).await?;
    let now = time_source.now();
    validate(details, time_source.today_in(&venue.timezone))?;
    let (reason, cascade_reason) = reasons(details.reason.as_deref());

    // lock courts in a stable order so concurrent requests cannot deadlock
    let mut court_ids = details.court_ids.clone();
    court_ids.sort_by_key(|id| id.0);
    court_ids.dedup();
    let lots: Vec<Lot> = Lot::ALL
        .into_iter()
        .filter(|lot| details.lots.contains(lot))
        .collect();

    let mut tx = pool.begin().await?;
    let mut created = Vec::new();
    let mut cancelled = Vec::new();

    for court_id in &court_ids {
        let court_name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM courts WHERE id = $1 FOR UPDATE",
        )
        .bind(court_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::CourtNotFound)?;

        for lot in &lots {
            let overlapping = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (
                    SELECT 1 FROM blocks
                    WHERE court_id = $1
                        AND lot = $2
                        AND start_date <= $4
                        AND end_date >= $3
                )",
            )
            .bind(court_id)
            .bind(lot)
            .bind(details.start_date.to_sqlx())
            .bind(details.end_date.to_sqlx())
            .fetch_one(&mut *tx)
            .await?;
            if overlapping {
                return Err(StoreError::OverlappingBlock);
            }

            let block_id = sqlx::query_scalar::<_, BlockId>(
                "INSERT INTO blocks (
                    court_id, lot, start_date, end_date, reason, created_by,
                    created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id",
            )
            .bind(court_id)
            .bind(lot)
            .bind(details.start_date.to_sqlx())
            .bind(details.end_date.to_sqlx())
            .bind(&reason)
            .bind(admin_id)
            .bind(now.to_sqlx())
            .fetch_one(&mut *tx)
            .await?;
            created.push(block_id);

            cancelled.extend(
                cancel_covered_bookings_tx(
                    court_id,
                    *lot,
                    details,
                    &cascade_reason,
                    time_source,
                    &mut tx,
                )
                .await?,
            );

            booking::record_cancellation_tx(
                None,
                now,
                now,
                &format!("Block created on {court_name} ({lot})"),
                now,
                &mut tx,
            )
            .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(
        blocks = created.len(),
        cancelled = cancelled.len(),
        "Blocks created"
    );
    Ok(BlockCreation {
        result: responses::BlockCreationResult {
            created,
            cancelled_count: cancelled.len() as u64,
        },
        cancelled,
    })
}

async fn cancel_covered_bookings_tx(
    court_id: &CourtId,
    lot: Lot,
    details: &requests::CreateBlocks,
    reason: &str,
    time_source: &TimeSource,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Vec<booking::CancelledBooking>, StoreError> {
    let now = time_source.now();
    let covered = sqlx::query_as::<_, responses::Booking>(&format!(
        "{} WHERE b.court_id = $1
            AND b.lot = $2
            AND b.booking_date BETWEEN $3 AND $4
            AND b.status IN ('pending', 'confirmed')
            AND b.start_at > $5
        ORDER BY b.start_at
        FOR UPDATE OF b",
        booking::BOOKING_SELECT
    ))
    .bind(court_id)
    .bind(lot)
    .bind(details.start_date.to_sqlx())
    .bind(details.end_date.to_sqlx())
    .bind(now.to_sqlx())
    .fetch_all(&mut **tx)
    .await?;

    let mut cancelled = Vec::with_capacity(covered.len());
    for mut covered_booking in covered {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(covered_booking.id)
        .bind(now.to_sqlx())
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            continue;
        }
        booking::record_cancellation_tx(
            Some(&covered_booking),
            now,
            now + booking::CANCELLATION_BANNER_TTL,
            reason,
            now,
            tx,
        )
        .await?;
        let recipients =
            booking::booking_recipients_tx(&covered_booking.id, tx).await?;
        covered_booking.status = BookingStatus::Cancelled;
        covered_booking.updated_at = now;
        cancelled.push(booking::CancelledBooking {
            booking: covered_booking,
            recipients,
            reason: reason.to_string(),
        });
    }
    Ok(cancelled)
}

/// Every block, soonest first.
#[tracing::instrument(skip(pool))]
pub async fn list_blocks(
    admin_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::Block>, StoreError> {
    admin::require_admin(admin_id, pool).await?;
    let blocks = sqlx::query_as::<_, responses::Block>(
        "SELECT
            b.id, b.court_id, c.name AS court_name, b.lot, b.start_date,
            b.end_date, b.reason, b.created_by, b.created_at
        FROM blocks b
        JOIN courts c ON c.id = b.court_id
        ORDER BY b.start_date, c.position, b.lot",
    )
    .fetch_all(pool)
    .await?;
    Ok(blocks)
}

/// Reopen a court. Bookings cancelled by the block stay cancelled.
#[tracing::instrument(skip(pool))]
pub async fn delete_block(
    admin_id: &UserId,
    block_id: &BlockId,
    pool: &PgPool,
) -> Result<(), StoreError> {
    admin::require_admin(admin_id, pool).await?;
    let result = sqlx::query("DELETE FROM blocks WHERE id = $1")
        .bind(block_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::BlockNotFound);
    }
    Ok(())
}
