use crate::{
    BlockId, BookingId, BookingStatus, CancellationId, CooldownPolicy, CourtId,
    Lot, ParticipantStatus, Role, UserId,
};
use jiff::{Timestamp, civil::Date};
#[cfg(feature = "use-sqlx")]
use jiff_sqlx::{Date as SqlxDate, Timestamp as SqlxTs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Court {
    pub id: CourtId,
    pub name: String,
    pub is_active: bool,
}

/// A free start time on a court.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub court_id: CourtId,
    pub court_name: String,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Booking {
    pub id: BookingId,
    pub court_id: CourtId,
    pub court_name: String,
    pub creator_id: UserId,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub start_at: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub end_at: Timestamp,
    pub lot: Lot,
    pub status: BookingStatus,
    pub reminder_sent: bool,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Participant {
    pub user_id: Option<UserId>,
    pub email: String,
    pub status: ParticipantStatus,
    #[cfg_attr(
        feature = "use-sqlx",
        sqlx(try_from = "crate::OptionalTimestamp")
    )]
    pub confirmed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ConfirmationResult {
    /// This participant was pending and is now confirmed.
    Confirmed {
        /// Whether this confirmation was the last one and promoted the
        /// booking.
        booking_confirmed: bool,
        pending_remaining: i64,
    },
    /// Nothing changed; the participant had confirmed earlier.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCreationResult {
    pub created: Vec<BlockId>,
    /// Bookings cancelled because they fell inside one of the new blocks.
    pub cancelled_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Block {
    pub id: BlockId,
    pub court_id: CourtId,
    pub court_name: String,
    pub lot: Lot,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxDate"))]
    pub start_date: Date,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxDate"))]
    pub end_date: Date,
    pub reason: Option<String>,
    pub created_by: UserId,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct CancellationRecord {
    pub id: CancellationId,
    pub booking_id: Option<BookingId>,
    #[cfg_attr(
        feature = "use-sqlx",
        sqlx(try_from = "crate::OptionalTimestamp")
    )]
    pub original_start: Option<Timestamp>,
    #[cfg_attr(
        feature = "use-sqlx",
        sqlx(try_from = "crate::OptionalTimestamp")
    )]
    pub original_end: Option<Timestamp>,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub display_from: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub display_to: Timestamp,
    pub reason: String,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

/// A message shown to everyone browsing slots shortly after a cancellation
/// frees one up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub booking_id: BookingId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct AdminBooking {
    pub id: BookingId,
    pub court_id: CourtId,
    pub court_name: String,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub start_at: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub end_at: Timestamp,
    pub status: BookingStatus,
    pub creator_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub cooldown_policy: CooldownPolicy,
    pub is_banned: bool,
    #[cfg_attr(
        feature = "use-sqlx",
        sqlx(try_from = "crate::OptionalTimestamp")
    )]
    pub last_login_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub cooldown_policy: CooldownPolicy,
    pub is_banned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct AdminStats {
    /// Non-banned accounts with the user role.
    pub users: i64,
    /// Pending or confirmed bookings that have not started.
    pub bookings: i64,
    /// Blocks that have not ended.
    pub blocks: i64,
    /// Cancellation records from the last seven days.
    pub audits: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    pub message: String,
}
