use crate::{
    AdminBookingsMode, BookingId, CooldownPolicy, CourtId, Lot, UserId,
    WindowSelection,
};
use jiff::{Timestamp, civil::Date};
use serde::{Deserialize, Serialize};

pub const EMAIL_MAX_LEN: usize = 255;
pub const MIN_PARTICIPANTS: u8 = 2;
pub const MAX_PARTICIPANTS: u8 = 6;
pub const BLOCK_REASON_MAX_LEN: usize = 500;

/// Check that an address looks like `local@domain.tld` with no whitespace.
///
/// This is only a syntactic check; whether the address belongs to a
/// registered account is decided by the server.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty()
        || email.len() > EMAIL_MAX_LEN
        || email.chars().any(char::is_whitespace)
    {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Normalize an address for comparison and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: Date,
    pub window: WindowSelection,
    pub participants: u8,
    /// Only honored for two participants (15 or 30 minutes).
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBooking {
    pub court_id: CourtId,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    /// Total number of players, the creator included.
    pub participants: u8,
    /// Invited players, excluding the creator.
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCancelBooking {
    pub booking_id: BookingId,
    pub reason: Option<String>,
}

/// Black out one or more courts for one or more lots over an inclusive date
/// range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlocks {
    pub court_ids: Vec<CourtId>,
    pub lots: Vec<Lot>,
    pub start_date: Date,
    pub end_date: Date,
    pub reason: Option<String>,
}

/// Fields left as `None` are not changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUser {
    pub user_id: UserId,
    pub cooldown_policy: Option<CooldownPolicy>,
    pub is_banned: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBookings {
    #[serde(default)]
    pub mode: AdminBookingsMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddAdmin {
    pub email: String,
}

/// Only accepted when the server is built with the `mock-auth` feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogin {
    pub email: String,
}
