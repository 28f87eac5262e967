//! The reservation lifecycle.
//!
//! ```text
//!             all players confirm
//!   pending ----------------------> confirmed
//!     |  \                              |
//!     |   \ cutoff sweep                | user/admin/block cancel
//!     |    v                            v
//!     |  auto_cancelled             cancelled
//!     |                                 ^
//!     +---------------------------------+
//!          user/admin/block cancel
//! ```
//!
//! Nothing leaves `cancelled` or `auto_cancelled`. Every transition out of
//! `pending`/`confirmed` is a conditional update, so the loser of a race sees
//! zero affected rows instead of clobbering the winner.

use derive_more::Display;
use jiff::{SignedDuration, Timestamp};
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    BookingId, BookingStatus, ParticipantStatus, UserId,
    requests::{self, normalize_email},
    responses::{self, ConfirmationResult},
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{StoreError, User, Venue, admin, catalog, eligibility, slots};
use crate::time::TimeSource;

/// How long an invitation link stays valid.
pub const CONFIRMATION_TOKEN_TTL: SignedDuration =
    SignedDuration::from_mins(60);
/// How long a cancellation is advertised to other players.
pub const CANCELLATION_BANNER_TTL: SignedDuration =
    SignedDuration::from_mins(15);
pub const USER_CANCEL_REASON: &str = "User cancelled";
pub const ADMIN_CANCEL_REASON: &str = "Admin cancelled";

const BANNER_LIMIT: i64 = 10;
const MY_BOOKINGS_LIMIT: i64 = 100;

/// Bookings joined to their court's name.
pub(crate) const BOOKING_SELECT: &str = "SELECT
        b.id, b.court_id, c.name AS court_name, b.creator_id, b.start_at,
        b.end_at, b.lot, b.status, b.reminder_sent, b.created_at, b.updated_at
    FROM bookings b
    JOIN courts c ON c.id = b.court_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, sqlx::Type, FromRow)]
#[sqlx(transparent)]
pub struct TokenId(pub Uuid);

/// An invited player and the token their confirmation link carries.
#[derive(Debug, Clone)]
pub struct Invitation {
    pub email: String,
    pub token: TokenId,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub created: responses::CreatedBooking,
    pub creator_email: String,
    pub invitations: Vec<Invitation>,
}

/// A booking that was just cancelled, with everyone who should hear about
/// it.
#[derive(Debug, Clone)]
pub struct CancelledBooking {
    pub booking: responses::Booking,
    pub recipients: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, FromRow)]
struct ConfirmationToken {
    booking_id: BookingId,
    email: String,
    #[sqlx(try_from = "SqlxTs")]
    expires_at: Timestamp,
}

/// Create a pending booking with the creator confirmed and every invitee
/// pending.
///
/// The returned invitations still have to be delivered; a delivery failure
/// does not undo the booking.
#[tracing::instrument(
    skip(details, venue, pool, time_source),
    fields(court_id = %details.court_id),
)]
pub async fn create_booking(
    details: &requests::CreateBooking,
    creator_id: &UserId,
    venue: &Venue,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<NewBooking, StoreError> {
    let participants = details.participants;
    let allowed = slots::allowed_minutes(participants)?;
    let expected = usize::from(participants) - 1;
    if details.emails.len() != expected {
        return Err(StoreError::InviteCountMismatch {
            expected,
            got: details.emails.len(),
        });
    }

    let (start, end) = (details.start_at, details.end_at);
    let length = end.duration_since(start);
    let minutes = length.as_mins();
    if length != SignedDuration::from_mins(minutes)
        || !allowed.contains(&minutes)
    {
        return Err(StoreError::InvalidDuration {
            participants,
            minutes,
        });
    }

    let now = time_source.now();
    if start < now + slots::MIN_LEAD_TIME {
        return Err(StoreError::InsufficientLeadTime);
    }
    let (date, window) = catalog::lot_for(start, end, &venue.timezone)?
        .ok_or(StoreError::OutsideOperatingWindow)?;
    if !catalog::in_horizon(time_source.today_in(&venue.timezone), date) {
        return Err(StoreError::DateOutsideHorizon);
    }

    let creator = super::read_user(pool, creator_id).await?;

    let mut tx = pool.begin().await?;

    let court_active = sqlx::query_scalar::<_, bool>(
        "SELECT is_active FROM courts WHERE id = $1",
    )
    .bind(details.court_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::CourtNotFound)?;
    if !court_active {
        return Err(StoreError::CourtInactive);
    }
    if catalog::is_blacked_out(
        &details.court_id,
        Some(window.lot),
        date,
        &mut *tx,
    )
    .await?
    {
        return Err(StoreError::CourtBlocked);
    }

    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM bookings
            WHERE court_id = $1
                AND status IN ('pending', 'confirmed', 'auto_cancelled')
                AND start_at < $3
                AND end_at > $2
        )",
    )
    .bind(details.court_id)
    .bind(start.to_sqlx())
    .bind(end.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;
    if taken {
        return Err(StoreError::SlotTaken);
    }

    let invitees =
        eligibility::validate_invites(&creator, &details.emails, venue, &mut tx)
            .await?;
    let players: Vec<User> =
        std::iter::once(creator.clone()).chain(invitees).collect();
    eligibility::check_participants(&players, start, end, now, &mut tx)
        .await?;

    // the exclusion constraint turns a lost race into SlotTaken here
    let booking_id = sqlx::query_scalar::<_, BookingId>(
        "INSERT INTO bookings (
            court_id, creator_id, start_at, end_at, lot, booking_date,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        RETURNING id",
    )
    .bind(details.court_id)
    .bind(creator.id)
    .bind(start.to_sqlx())
    .bind(end.to_sqlx())
    .bind(window.lot)
    .bind(date.to_sqlx())
    .bind(now.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    let mut invitations = Vec::with_capacity(players.len() - 1);
    for (i, player) in players.iter().enumerate() {
        let (status, confirmed_at) = if i == 0 {
            (ParticipantStatus::Confirmed, Some(now.to_sqlx()))
        } else {
            (ParticipantStatus::Pending, None)
        };
        sqlx::query(
            "INSERT INTO booking_participants (
                booking_id, user_id, email, status, confirmed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(booking_id)
        .bind(player.id)
        .bind(&player.email)
        .bind(status)
        .bind(confirmed_at)
        .bind(now.to_sqlx())
        .execute(&mut *tx)
        .await?;

        if i > 0 {
            let token = sqlx::query_scalar::<_, TokenId>(
                "INSERT INTO confirmation_tokens (
                    booking_id, email, expires_at, created_at
                ) VALUES ($1, $2, $3, $4)
                RETURNING id",
            )
            .bind(booking_id)
            .bind(&player.email)
            .bind((now + CONFIRMATION_TOKEN_TTL).to_sqlx())
            .bind(now.to_sqlx())
            .fetch_one(&mut *tx)
            .await?;
            invitations.push(Invitation {
                email: player.email.clone(),
                token,
            });
        }
    }

    let booking = read_booking_tx(&booking_id, false, &mut tx).await?;
    let participants = list_participants_tx(&booking_id, &mut tx).await?;
    tx.commit().await?;

    tracing::info!(booking_id = %booking.id, "Booking created");
    Ok(NewBooking {
        created: responses::CreatedBooking {
            booking,
            participants,
        },
        creator_email: creator.email,
        invitations,
    })
}

/// Mark one player's place as confirmed, promoting the booking once nobody
/// is left pending.
///
/// Confirming twice is a no-op that reports
/// [`ConfirmationResult::AlreadyConfirmed`].
#[tracing::instrument(skip(pool, time_source), ret)]
pub async fn confirm_participant(
    booking_id: &BookingId,
    email: &str,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<ConfirmationResult, StoreError> {
    let email = normalize_email(email);
    let now = time_source.now();
    let mut tx = pool.begin().await?;

    let status = sqlx::query_scalar::<_, BookingStatus>(
        "SELECT status FROM bookings WHERE id = $1 FOR UPDATE",
    )
    .bind(booking_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::BookingNotFound)?;
    if status.is_cancelled() {
        return Err(StoreError::AlreadyCancelled);
    }

    let participant_status = sqlx::query_scalar::<_, ParticipantStatus>(
        "SELECT status FROM booking_participants
        WHERE booking_id = $1 AND LOWER(email) = $2",
    )
    .bind(booking_id)
    .bind(&email)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::ParticipantNotFound)?;
    if participant_status == ParticipantStatus::Confirmed {
        return Ok(ConfirmationResult::AlreadyConfirmed);
    }

    let updated = sqlx::query(
        "UPDATE booking_participants
        SET status = 'confirmed', confirmed_at = $3
        WHERE booking_id = $1 AND LOWER(email) = $2 AND status = 'pending'",
    )
    .bind(booking_id)
    .bind(&email)
    .bind(now.to_sqlx())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(ConfirmationResult::AlreadyConfirmed);
    }

    let pending_remaining = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM booking_participants
        WHERE booking_id = $1 AND status = 'pending'",
    )
    .bind(booking_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut booking_confirmed = false;
    if pending_remaining == 0 && status == BookingStatus::Pending {
        let promoted = sqlx::query(
            "UPDATE bookings SET status = 'confirmed', updated_at = $2
            WHERE id = $1 AND status = 'pending'",
        )
        .bind(booking_id)
        .bind(now.to_sqlx())
        .execute(&mut *tx)
        .await?;
        booking_confirmed = promoted.rows_affected() == 1;
    }

    tx.commit().await?;
    if booking_confirmed {
        tracing::info!(%booking_id, "Booking confirmed");
    }
    Ok(ConfirmationResult::Confirmed {
        booking_confirmed,
        pending_remaining,
    })
}

/// Confirm through an invitation link.
///
/// Tokens are not consumed: following a link twice reports
/// `AlreadyConfirmed` the second time.
#[tracing::instrument(skip(pool, time_source))]
pub async fn confirm_with_token(
    token: &TokenId,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<ConfirmationResult, StoreError> {
    let token = sqlx::query_as::<_, ConfirmationToken>(
        "SELECT booking_id, email, expires_at FROM confirmation_tokens
        WHERE id = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::TokenNotFound)?;
    if time_source.now() >= token.expires_at {
        return Err(StoreError::TokenExpired);
    }
    confirm_participant(&token.booking_id, &token.email, pool, time_source)
        .await
}

/// Cancel a booking the actor plays in.
#[tracing::instrument(skip(pool, time_source))]
pub async fn cancel_booking(
    booking_id: &BookingId,
    actor: &UserId,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<(), StoreError> {
    let now = time_source.now();
    let mut tx = pool.begin().await?;
    let booking = read_booking_tx(booking_id, true, &mut tx).await?;

    let is_player = booking.creator_id == *actor
        || sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM booking_participants
                WHERE booking_id = $1 AND user_id = $2
            )",
        )
        .bind(booking_id)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;
    if !is_player {
        return Err(StoreError::NotYourBooking);
    }

    cancel_tx(&booking, now, &mut tx).await?;
    record_cancellation_tx(
        Some(&booking),
        now,
        now + CANCELLATION_BANNER_TTL,
        USER_CANCEL_REASON,
        now,
        &mut tx,
    )
    .await?;
    tx.commit().await?;
    tracing::info!(%booking_id, "Booking cancelled by player");
    Ok(())
}

/// Cancel any booking as an administrator. Everyone involved should be told.
#[tracing::instrument(
    skip(details, pool, time_source),
    fields(booking_id = %details.booking_id),
)]
pub async fn admin_cancel_booking(
    details: &requests::AdminCancelBooking,
    admin_id: &UserId,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<CancelledBooking, StoreError> {
    admin::require_admin(admin_id, pool).await?;
    let reason = details
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or(ADMIN_CANCEL_REASON)
        .to_string();
    if reason.len() > requests::BLOCK_REASON_MAX_LEN {
        return Err(StoreError::FieldTooLong);
    }

    let now = time_source.now();
    let mut tx = pool.begin().await?;
    let mut booking =
        read_booking_tx(&details.booking_id, true, &mut tx).await?;
    cancel_tx(&booking, now, &mut tx).await?;
    record_cancellation_tx(
        Some(&booking),
        now,
        now + CANCELLATION_BANNER_TTL,
        &reason,
        now,
        &mut tx,
    )
    .await?;
    let recipients = booking_recipients_tx(&booking.id, &mut tx).await?;
    tx.commit().await?;

    booking.status = BookingStatus::Cancelled;
    booking.updated_at = now;
    tracing::info!(booking_id = %booking.id, "Booking cancelled by admin");
    Ok(CancelledBooking {
        booking,
        recipients,
        reason,
    })
}

/// Flip a locked booking to `cancelled` if it is still active and far
/// enough from its start.
async fn cancel_tx(
    booking: &responses::Booking,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    if booking.status.is_cancelled() {
        return Err(StoreError::AlreadyCancelled);
    }
    if booking.start_at.duration_since(now) < slots::MIN_LEAD_TIME {
        return Err(StoreError::CancellationTooLate);
    }
    let result = sqlx::query(
        "UPDATE bookings SET status = 'cancelled', updated_at = $2
        WHERE id = $1 AND status IN ('pending', 'confirmed')",
    )
    .bind(booking.id)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::AlreadyCancelled);
    }
    Ok(())
}

/// Append to the cancellation log. `booking` is `None` for administrative
/// events that are not about a single booking.
pub(crate) async fn record_cancellation_tx(
    booking: Option<&responses::Booking>,
    display_from: Timestamp,
    display_to: Timestamp,
    reason: &str,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO cancellation_records (
            booking_id, original_start, original_end, display_from,
            display_to, reason, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(booking.map(|b| b.id))
    .bind(booking.map(|b| b.start_at.to_sqlx()))
    .bind(booking.map(|b| b.end_at.to_sqlx()))
    .bind(display_from.to_sqlx())
    .bind(display_to.to_sqlx())
    .bind(reason)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn read_booking_tx(
    booking_id: &BookingId,
    for_update: bool,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<responses::Booking, StoreError> {
    let lock = if for_update { "FOR UPDATE OF b" } else { "" };
    sqlx::query_as::<_, responses::Booking>(&format!(
        "{BOOKING_SELECT} WHERE b.id = $1 {lock}"
    ))
    .bind(booking_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::BookingNotFound)
}

/// Players of a booking, creator first.
pub(crate) async fn list_participants_tx(
    booking_id: &BookingId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Vec<responses::Participant>, StoreError> {
    let participants = sqlx::query_as::<_, responses::Participant>(
        "SELECT p.user_id, p.email, p.status, p.confirmed_at
        FROM booking_participants p
        JOIN bookings b ON b.id = p.booking_id
        WHERE p.booking_id = $1
        ORDER BY COALESCE(p.user_id = b.creator_id, false) DESC, p.email",
    )
    .bind(booking_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(participants)
}

/// Every distinct address involved in a booking, the creator included.
pub(crate) async fn booking_recipients_tx(
    booking_id: &BookingId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Vec<String>, StoreError> {
    let emails = sqlx::query_scalar::<_, String>(
        "SELECT email FROM booking_participants WHERE booking_id = $1
        UNION
        SELECT u.email FROM bookings b
        JOIN users u ON u.id = b.creator_id
        WHERE b.id = $1
        ORDER BY email",
    )
    .bind(booking_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(emails)
}

/// Bookings the user plays in, latest start first.
#[tracing::instrument(skip(pool))]
pub async fn list_my_bookings(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::Booking>, StoreError> {
    let bookings = sqlx::query_as::<_, responses::Booking>(&format!(
        "{BOOKING_SELECT}
        WHERE b.creator_id = $1
            OR EXISTS (
                SELECT 1 FROM booking_participants p
                WHERE p.booking_id = b.id AND p.user_id = $1
            )
        ORDER BY b.start_at DESC
        LIMIT $2"
    ))
    .bind(user_id)
    .bind(MY_BOOKINGS_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(bookings)
}

#[derive(Debug, FromRow)]
struct BannerRow {
    booking_id: BookingId,
    court_name: String,
    #[sqlx(try_from = "SqlxTs")]
    start_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    end_at: Timestamp,
}

pub fn banner_message(
    court_name: &str,
    start: Timestamp,
    end: Timestamp,
    venue: &Venue,
) -> String {
    format!(
        "Slot {}–{} at {court_name} was cancelled.",
        venue.local(start).strftime("%H:%M"),
        venue.local(end).strftime("%H:%M"),
    )
}

/// Recently freed slots, newest first.
#[tracing::instrument(skip(venue, pool, time_source))]
pub async fn list_cancellation_banners(
    venue: &Venue,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Vec<responses::Banner>, StoreError> {
    let rows = sqlx::query_as::<_, BannerRow>(
        "SELECT r.booking_id, c.name AS court_name, b.start_at, b.end_at
        FROM cancellation_records r
        JOIN bookings b ON b.id = r.booking_id
        JOIN courts c ON c.id = b.court_id
        WHERE r.display_from <= $1 AND r.display_to > $1
        ORDER BY r.created_at DESC
        LIMIT $2",
    )
    .bind(time_source.now().to_sqlx())
    .bind(BANNER_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| responses::Banner {
            booking_id: row.booking_id,
            message: banner_message(
                &row.court_name,
                row.start_at,
                row.end_at,
                venue,
            ),
        })
        .collect())
}
