//! Free start times on each court.

use std::collections::HashMap;

use jiff::{SignedDuration, Timestamp};
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{CourtId, requests, responses};
use sqlx::PgPool;

use super::{StoreError, Venue, catalog};
use crate::time::TimeSource;

/// Slots start on quarter hours from the window opening.
pub const SLOT_STEP: SignedDuration = SignedDuration::from_mins(15);
/// Nothing can be booked, or cancelled, closer to its start than this.
pub const MIN_LEAD_TIME: SignedDuration = SignedDuration::from_hours(1);

/// Minutes a booking may last for a player count. The first entry is the
/// default.
pub fn allowed_minutes(participants: u8) -> Result<&'static [i64], StoreError> {
    match participants {
        2 => Ok(&[30, 15]),
        3 => Ok(&[45]),
        4..=6 => Ok(&[60]),
        n => Err(StoreError::InvalidParticipantCount(n)),
    }
}

/// Resolve the booking length. A requested duration is only honored for two
/// players.
pub fn duration_for(
    participants: u8,
    requested_minutes: Option<i64>,
) -> Result<SignedDuration, StoreError> {
    let allowed = allowed_minutes(participants)?;
    let minutes = match requested_minutes {
        Some(minutes) if participants == 2 => {
            if !allowed.contains(&minutes) {
                return Err(StoreError::InvalidDuration {
                    participants,
                    minutes,
                });
            }
            minutes
        }
        _ => allowed[0],
    };
    Ok(SignedDuration::from_mins(minutes))
}

/// Start/end pairs inside `window` that begin no earlier than
/// `earliest_start` and overlap none of the `busy` intervals.
pub fn generate_slots(
    window: &catalog::Window,
    duration: SignedDuration,
    busy: &[(Timestamp, Timestamp)],
    earliest_start: Timestamp,
) -> Vec<(Timestamp, Timestamp)> {
    let mut slots = Vec::new();
    let mut start = window.start;
    while start + duration <= window.end {
        let end = start + duration;
        let free = !busy
            .iter()
            .any(|(busy_start, busy_end)| {
                *busy_start < end && *busy_end > start
            });
        if start >= earliest_start && free {
            slots.push((start, end));
        }
        start += SLOT_STEP;
    }
    slots
}

#[tracing::instrument(skip(venue, pool, time_source), ret(level = "debug"))]
pub async fn list_available_slots(
    query: &requests::SlotQuery,
    venue: &Venue,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Vec<responses::Slot>, StoreError> {
    let duration = duration_for(query.participants, query.duration_minutes)?;
    let today = time_source.today_in(&venue.timezone);
    if !catalog::in_horizon(today, query.date) {
        return Err(StoreError::DateOutsideHorizon);
    }
    let earliest_start = time_source.now() + MIN_LEAD_TIME;

    let windows = query
        .window
        .lots()
        .iter()
        .map(|lot| catalog::window_for(query.date, *lot, &venue.timezone))
        .collect::<Result<Vec<_>, _>>()?;

    let day_start = query.date.to_zoned(venue.timezone.clone())?;
    let day_end = query.date.tomorrow()?.to_zoned(venue.timezone.clone())?;

    // auto-cancelled bookings keep their slot occupied
    let rows = sqlx::query_as::<_, (CourtId, SqlxTs, SqlxTs)>(
        "SELECT court_id, start_at, end_at FROM bookings
        WHERE status IN ('pending', 'confirmed', 'auto_cancelled')
            AND start_at < $2
            AND end_at > $1",
    )
    .bind(day_start.timestamp().to_sqlx())
    .bind(day_end.timestamp().to_sqlx())
    .fetch_all(pool)
    .await?;
    let mut busy: HashMap<CourtId, Vec<(Timestamp, Timestamp)>> =
        HashMap::new();
    for (court_id, start_at, end_at) in rows {
        busy.entry(court_id)
            .or_default()
            .push((start_at.to_jiff(), end_at.to_jiff()));
    }

    let mut slots = Vec::new();
    for court in catalog::list_courts(pool).await? {
        let court_busy =
            busy.get(&court.id).map(Vec::as_slice).unwrap_or_default();
        for window in &windows {
            if catalog::is_blacked_out(
                &court.id,
                Some(window.lot),
                query.date,
                pool,
            )
            .await?
            {
                continue;
            }
            slots.extend(
                generate_slots(window, duration, court_busy, earliest_start)
                    .into_iter()
                    .map(|(start_at, end_at)| responses::Slot {
                        court_id: court.id,
                        court_name: court.name.clone(),
                        start_at,
                        end_at,
                    }),
            );
        }
    }
    Ok(slots)
}
