//! Database store for the court booking service.
//!
//! ## Design Decisions
//!
//! ### Time Source Dependency
//! - Every function that needs the current instant takes a `TimeSource`
//!   instead of reading the clock, so tests can walk a booking through its
//!   lifecycle with mocked time.
//! - Venue rules (time zone and institution email domain) are passed in as a
//!   [`Venue`]; nothing here reads configuration.
//!
//! ### Conflict Arbitration
//! - The `bookings_no_overlap` exclusion constraint is the final word on
//!   whether two bookings collide. Application pre-checks exist only to give
//!   a friendlier error before the insert.
//! - Terminal status changes are conditional updates (`WHERE status = ...`).
//!   Zero affected rows means another writer got there first.
//!
//! ### Type Safety
//! - Id newtypes from `payloads` implement `sqlx::Type`, so they bind
//!   directly without reaching for the inner UUID.

pub mod admin;
pub mod block;
pub mod booking;
pub mod catalog;
pub mod eligibility;
pub mod slots;

use jiff::{Timestamp, Zoned, tz::TimeZone};
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    CooldownPolicy, OptionalTimestamp, Role, UserId,
    requests::normalize_email, responses,
};
use sqlx::{FromRow, PgPool};

use crate::time::TimeSource;

pub use block::{create_blocks, delete_block, list_blocks};
pub use booking::{
    admin_cancel_booking, cancel_booking, confirm_participant,
    confirm_with_token, create_booking, list_cancellation_banners,
    list_my_bookings,
};
pub use slots::list_available_slots;

/// Time zone and membership rules of the venue being booked.
#[derive(Debug, Clone)]
pub struct Venue {
    /// Operating windows are wall-clock times in this zone.
    pub timezone: TimeZone,
    /// Invited players must have an address in this domain.
    pub email_domain: String,
}

impl Venue {
    pub fn new(timezone: TimeZone, email_domain: impl Into<String>) -> Self {
        Self {
            timezone,
            email_domain: normalize_email(&email_domain.into()),
        }
    }

    /// Express an instant on the venue's wall clock.
    pub fn local(&self, timestamp: Timestamp) -> Zoned {
        timestamp.to_zoned(self.timezone.clone())
    }

    /// Whether the address belongs to the institution, subdomains included.
    pub fn accepts_domain(&self, email: &str) -> bool {
        email.rsplit_once('@').is_some_and(|(_, domain)| {
            domain == self.email_domain
                || domain
                    .strip_suffix(self.email_domain.as_str())
                    .is_some_and(|sub| sub.ends_with('.'))
        })
    }
}

/// A complete user row that stays in the backend.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub is_banned: bool,
    pub cooldown_policy: CooldownPolicy,
    #[sqlx(try_from = "OptionalTimestamp")]
    pub last_login_at: Option<Timestamp>,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

impl From<User> for responses::UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            role: user.role,
            cooldown_policy: user.cooldown_policy,
            is_banned: user.is_banned,
        }
    }
}

/// How a failure should be reported to whoever asked for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// Well-formed input refused by a booking rule (ban, cooldown, lead
    /// time).
    Policy,
    /// Lost a race or acted on something already finished.
    Conflict,
    NotFound,
    Forbidden,
    /// Infrastructure failure; the detail is logged, not shown.
    Transient,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("A booking needs between 2 and 6 players, got {0}")]
    InvalidParticipantCount(u8),
    #[error(
        "A booking for {participants} players cannot last {minutes} minutes"
    )]
    InvalidDuration { participants: u8, minutes: i64 },
    #[error("Expected {expected} invited players, got {got}")]
    InviteCountMismatch { expected: usize, got: usize },
    #[error("Invalid invites: {}", .0.join("; "))]
    InvalidInvites(Vec<String>),
    #[error("{0} is not a valid email address")]
    InvalidEmail(String),
    #[error("Bookings can only be made for today and the next two days")]
    DateOutsideHorizon,
    #[error("Bookings must start at least 1 hour from now")]
    InsufficientLeadTime,
    #[error("Booking must lie within the morning or evening window")]
    OutsideOperatingWindow,
    #[error("Court not found")]
    CourtNotFound,
    #[error("Court is not available for booking")]
    CourtInactive,
    #[error("Court is blocked for that time")]
    CourtBlocked,
    #[error("Slot already taken")]
    SlotTaken,
    #[error("{0} is banned.")]
    Banned(String),
    #[error("{who} can book again after {days_left} day(s).")]
    CooldownActive { who: String, days_left: i64 },
    #[error("{0} already has a booking at that time.")]
    ParticipantConflict(String),
    #[error("Booking not found")]
    BookingNotFound,
    #[error("Not your booking")]
    NotYourBooking,
    #[error("Participant not found")]
    ParticipantNotFound,
    #[error("Booking is already cancelled")]
    AlreadyCancelled,
    #[error("Bookings can only be cancelled at least 1 hour before they start")]
    CancellationTooLate,
    #[error("Confirmation link not found")]
    TokenNotFound,
    #[error("Confirmation link has expired")]
    TokenExpired,
    #[error("Administrator permissions required")]
    RequiresAdmin,
    #[error("Access denied: your account has been banned.")]
    AccountBanned,
    #[error("Access denied: only institution addresses can sign in.")]
    OutsideInstitution,
    #[error("User not found")]
    UserNotFound,
    #[error("Block not found")]
    BlockNotFound,
    #[error("Select at least one court and one lot")]
    EmptyBlockSelection,
    #[error("Block start date must not be after its end date")]
    InvalidBlockRange,
    #[error("Blocks cannot start before today")]
    BlockInPast,
    #[error("Blocks can cover at most 30 days and end within 30 days")]
    BlockOutsideHorizon,
    #[error("Overlapping block exists")]
    OverlappingBlock,
    #[error("Field too long")]
    FieldTooLong,
    #[error("Unique constraint violation")]
    NotUnique(#[source] sqlx::Error),
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Invalid time")]
    Time(#[from] jiff::Error),
    #[error("Unexpected error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        use StoreError::*;
        match self {
            InvalidParticipantCount(_)
            | InvalidDuration { .. }
            | InviteCountMismatch { .. }
            | InvalidInvites(_)
            | InvalidEmail(_)
            | DateOutsideHorizon
            | OutsideOperatingWindow
            | TokenExpired
            | EmptyBlockSelection
            | InvalidBlockRange
            | BlockInPast
            | BlockOutsideHorizon
            | FieldTooLong => ErrorKind::Validation,
            InsufficientLeadTime
            | CourtInactive
            | CourtBlocked
            | Banned(_)
            | CooldownActive { .. }
            | ParticipantConflict(_)
            | CancellationTooLate
            | OverlappingBlock => ErrorKind::Policy,
            SlotTaken | AlreadyCancelled | NotUnique(_) => ErrorKind::Conflict,
            CourtNotFound | BookingNotFound | NotYourBooking
            | ParticipantNotFound | TokenNotFound | UserNotFound
            | BlockNotFound => ErrorKind::NotFound,
            RequiresAdmin | AccountBanned | OutsideInstitution => {
                ErrorKind::Forbidden
            }
            Database(_) | Time(_) | UnexpectedError(_) => ErrorKind::Transient,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::NotUnique(e);
            }
            // exclusion_violation: the only exclusion constraint guards
            // overlapping bookings on a court
            if db_err.code().as_deref() == Some("23P01") {
                return StoreError::SlotTaken;
            }
        }
        StoreError::Database(e)
    }
}

/// Create the user on first sign-in, and record the login time.
///
/// This is the hook the external identity provider calls once it has
/// verified the address. New accounts must use an institution address;
/// existing administrators may sign in from any domain.
#[tracing::instrument(skip(venue, pool, time_source))]
pub async fn sign_in(
    email: &str,
    venue: &Venue,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<User, StoreError> {
    let email = normalize_email(email);
    let in_institution = venue.accepts_domain(&email);
    match get_user_by_email(&email, pool).await {
        Ok(user) => {
            if user.is_banned {
                return Err(StoreError::AccountBanned);
            }
            if !user.role.is_admin() && !in_institution {
                return Err(StoreError::OutsideInstitution);
            }
            let user = sqlx::query_as::<_, User>(
                "UPDATE users SET last_login_at = $1 WHERE id = $2
                RETURNING *",
            )
            .bind(time_source.now().to_sqlx())
            .bind(user.id)
            .fetch_one(pool)
            .await?;
            Ok(user)
        }
        Err(StoreError::UserNotFound) => {
            if !in_institution {
                return Err(StoreError::OutsideInstitution);
            }
            let user = sqlx::query_as::<_, User>(
                "INSERT INTO users (email, last_login_at, created_at, updated_at)
                VALUES ($1, $2, $2, $2)
                RETURNING *",
            )
            .bind(&email)
            .bind(time_source.now().to_sqlx())
            .fetch_one(pool)
            .await?;
            Ok(user)
        }
        Err(e) => Err(e),
    }
}

/// Create an account with the given role, or set the role of an existing
/// one. Newly promoted administrators rank below every existing one.
pub async fn provision_user(
    email: &str,
    role: Role,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<User, StoreError> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, role, admin_rank, created_at, updated_at)
        VALUES (
            $1, $2,
            CASE WHEN $2 = 'admin'::user_role
                THEN nextval('admin_rank_seq') END,
            $3, $3
        )
        ON CONFLICT ((LOWER(email))) DO UPDATE SET
            role = EXCLUDED.role,
            admin_rank = CASE WHEN EXCLUDED.role = 'admin'::user_role
                THEN COALESCE(users.admin_rank, EXCLUDED.admin_rank) END
        RETURNING *",
    )
    .bind(normalize_email(email))
    .bind(role)
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn read_user(pool: &PgPool, id: &UserId) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => StoreError::UserNotFound,
            e => e.into(),
        })
}

pub async fn get_user_by_email(
    email: &str,
    pool: &PgPool,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE LOWER(email) = LOWER($1)",
    )
    .bind(email.trim())
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::UserNotFound)
}
