//! Types shared between the api server and its clients.

pub mod api_client;
pub mod requests;
pub mod responses;

pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct UserId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct CourtId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct BookingId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct BlockId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct CancellationId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[display("user")]
    User,
    #[display("admin")]
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// How long a user has to wait after the start of their last played (or
/// missed) booking before they can be part of another one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(type_name = "cooldown_policy"))]
pub enum CooldownPolicy {
    #[display("1d")]
    #[serde(rename = "1d")]
    #[cfg_attr(feature = "use-sqlx", sqlx(rename = "1d"))]
    OneDay,
    #[display("2d")]
    #[serde(rename = "2d")]
    #[cfg_attr(feature = "use-sqlx", sqlx(rename = "2d"))]
    TwoDays,
    #[display("3d")]
    #[serde(rename = "3d")]
    #[cfg_attr(feature = "use-sqlx", sqlx(rename = "3d"))]
    ThreeDays,
}

impl CooldownPolicy {
    pub fn days(&self) -> i64 {
        match self {
            Self::OneDay => 1,
            Self::TwoDays => 2,
            Self::ThreeDays => 3,
        }
    }
}

/// A named time-of-day window within which a court can be reserved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "lot", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Lot {
    #[display("morning")]
    Morning,
    #[display("evening")]
    Evening,
}

impl Lot {
    pub const ALL: [Lot; 2] = [Lot::Morning, Lot::Evening];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "booking_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[display("pending")]
    Pending,
    #[display("confirmed")]
    Confirmed,
    #[display("cancelled")]
    Cancelled,
    #[display("auto_cancelled")]
    AutoCancelled,
}

impl BookingStatus {
    /// Cancelled and auto-cancelled bookings can never change state again.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::AutoCancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "participant_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[display("pending")]
    Pending,
    #[display("confirmed")]
    Confirmed,
}

/// Which part of the day to search for free slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WindowSelection {
    #[display("morning")]
    Morning,
    #[display("evening")]
    Evening,
    /// Morning and evening, never the afternoon gap between them.
    #[display("full")]
    Full,
}

impl WindowSelection {
    pub fn lots(&self) -> &'static [Lot] {
        match self {
            Self::Morning => &[Lot::Morning],
            Self::Evening => &[Lot::Evening],
            Self::Full => &Lot::ALL,
        }
    }
}

/// Filters for the administrator's booking overview.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AdminBookingsMode {
    /// Not cancelled and still far enough out to be cancellable.
    #[default]
    #[display("upcoming")]
    Upcoming,
    /// Starting or ending within an hour of now.
    #[display("current")]
    Current,
    #[display("all")]
    All,
}

/// Wrapper to read a nullable timestamp column with sqlx.
#[cfg(feature = "use-sqlx")]
#[derive(Debug, Clone, sqlx::Type)]
#[sqlx(transparent)]
pub struct OptionalTimestamp(pub Option<jiff_sqlx::Timestamp>);

#[cfg(feature = "use-sqlx")]
impl From<OptionalTimestamp> for Option<jiff::Timestamp> {
    fn from(ts: OptionalTimestamp) -> Self {
        ts.0.map(|ts| ts.to_jiff())
    }
}
