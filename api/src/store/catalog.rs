//! Operating windows, the booking horizon, and blackout coverage.
//!
//! ```text
//!           06:00     09:00 (weekdays)          16:00            22:00
//!             |  morning  |                       |    evening     |
//!             |  morning         | 11:00 (weekends)
//! ```
//!
//! Windows are wall-clock times at the venue. Everything except
//! [`is_blacked_out`] is pure.

use jiff::{
    Timestamp,
    civil::{Date, Time, Weekday, time},
    tz::TimeZone,
};
use jiff_sqlx::ToSqlx;
use payloads::{CourtId, Lot, responses};
use sqlx::PgPool;

use super::StoreError;

pub const MORNING_OPEN: Time = time(6, 0, 0, 0);
pub const WEEKDAY_MORNING_CLOSE: Time = time(9, 0, 0, 0);
pub const WEEKEND_MORNING_CLOSE: Time = time(11, 0, 0, 0);
pub const EVENING_OPEN: Time = time(16, 0, 0, 0);
pub const EVENING_CLOSE: Time = time(22, 0, 0, 0);

/// Days after today that can still be booked.
pub const BOOKING_HORIZON_DAYS: i32 = 2;

/// An operating window resolved to absolute instants for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lot: Lot,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn contains(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= start && end <= self.end
    }
}

pub fn is_weekend(date: Date) -> bool {
    matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

/// Opening and closing wall-clock times of a lot on a date.
pub fn local_window(date: Date, lot: Lot) -> (Time, Time) {
    match lot {
        Lot::Morning if is_weekend(date) => {
            (MORNING_OPEN, WEEKEND_MORNING_CLOSE)
        }
        Lot::Morning => (MORNING_OPEN, WEEKDAY_MORNING_CLOSE),
        Lot::Evening => (EVENING_OPEN, EVENING_CLOSE),
    }
}

pub fn window_for(
    date: Date,
    lot: Lot,
    tz: &TimeZone,
) -> Result<Window, StoreError> {
    let (open, close) = local_window(date, lot);
    Ok(Window {
        lot,
        start: date.to_datetime(open).to_zoned(tz.clone())?.timestamp(),
        end: date.to_datetime(close).to_zoned(tz.clone())?.timestamp(),
    })
}

/// The window that fully contains `[start, end)`, along with the venue-local
/// date it belongs to.
pub fn lot_for(
    start: Timestamp,
    end: Timestamp,
    tz: &TimeZone,
) -> Result<Option<(Date, Window)>, StoreError> {
    let date = start.to_zoned(tz.clone()).date();
    for lot in Lot::ALL {
        let window = window_for(date, lot, tz)?;
        if window.contains(start, end) {
            return Ok(Some((date, window)));
        }
    }
    Ok(None)
}

/// Whether `date` is today, tomorrow, or the day after.
pub fn in_horizon(today: Date, date: Date) -> bool {
    let offset = (date - today).get_days();
    (0..=BOOKING_HORIZON_DAYS).contains(&offset)
}

/// Whether a block covers the court on `date`, for one lot or, with `None`,
/// for any lot.
#[tracing::instrument(skip(executor))]
pub async fn is_blacked_out<'e, E>(
    court_id: &CourtId,
    lot: Option<Lot>,
    date: Date,
    executor: E,
) -> Result<bool, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let blocked = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM blocks
            WHERE court_id = $1
                AND ($2::lot IS NULL OR lot = $2)
                AND start_date <= $3
                AND end_date >= $3
        )",
    )
    .bind(court_id)
    .bind(lot)
    .bind(date.to_sqlx())
    .fetch_one(executor)
    .await?;
    Ok(blocked)
}

/// Active courts in the order they were added.
pub async fn list_courts(
    pool: &PgPool,
) -> Result<Vec<responses::Court>, StoreError> {
    let courts = sqlx::query_as::<_, responses::Court>(
        "SELECT id, name, is_active FROM courts
        WHERE is_active
        ORDER BY position",
    )
    .fetch_all(pool)
    .await?;
    Ok(courts)
}

/// Add a court. Used by provisioning, not exposed over HTTP.
pub async fn create_court(
    name: &str,
    pool: &PgPool,
) -> Result<responses::Court, StoreError> {
    let court = sqlx::query_as::<_, responses::Court>(
        "INSERT INTO courts (name) VALUES ($1)
        RETURNING id, name, is_active",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(court)
}

/// Hide or restore a court. Existing bookings are left alone.
pub async fn set_court_active(
    court_id: &CourtId,
    is_active: bool,
    pool: &PgPool,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE courts SET is_active = $1 WHERE id = $2")
        .bind(is_active)
        .bind(court_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::CourtNotFound);
    }
    Ok(())
}
