//! Administrator views and account management.

use jiff::SignedDuration;
use jiff_sqlx::ToSqlx;
use payloads::{
    AdminBookingsMode, BookingId, Role, UserId,
    requests::{self, normalize_email},
    responses,
};
use sqlx::PgPool;

use super::{StoreError, User, Venue, booking, read_user, slots};
use crate::time::TimeSource;

const AUDIT_LIMIT: i64 = 50;
const ALL_BOOKINGS_LIMIT: i64 = 200;
/// How far around now the `current` booking view reaches.
const CURRENT_WINDOW: SignedDuration = SignedDuration::from_hours(1);
const AUDIT_STATS_WINDOW: SignedDuration = SignedDuration::from_hours(24 * 7);

/// Load the user and check they hold the admin role.
pub async fn require_admin(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<User, StoreError> {
    let user = read_user(pool, user_id).await.map_err(|e| match e {
        StoreError::UserNotFound => StoreError::RequiresAdmin,
        e => e,
    })?;
    if !user.role.is_admin() {
        return Err(StoreError::RequiresAdmin);
    }
    Ok(user)
}

#[tracing::instrument(skip(pool))]
pub async fn list_users(
    admin_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::UserSummary>, StoreError> {
    require_admin(admin_id, pool).await?;
    let users = sqlx::query_as::<_, responses::UserSummary>(
        "SELECT id, email, role, cooldown_policy, is_banned, last_login_at
        FROM users
        ORDER BY email",
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Change a player's cooldown policy or ban status. Omitted fields keep
/// their value.
#[tracing::instrument(skip(pool))]
pub async fn update_user(
    admin_id: &UserId,
    details: &requests::UpdateUser,
    pool: &PgPool,
) -> Result<(), StoreError> {
    require_admin(admin_id, pool).await?;
    let result = sqlx::query(
        "UPDATE users SET
            cooldown_policy = COALESCE($2, cooldown_policy),
            is_banned = COALESCE($3, is_banned)
        WHERE id = $1",
    )
    .bind(details.user_id)
    .bind(details.cooldown_policy)
    .bind(details.is_banned)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::UserNotFound);
    }
    Ok(())
}

/// Administrators, most senior first.
#[tracing::instrument(skip(pool))]
pub async fn list_admins(
    admin_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::UserSummary>, StoreError> {
    require_admin(admin_id, pool).await?;
    let admins = sqlx::query_as::<_, responses::UserSummary>(
        "SELECT id, email, role, cooldown_policy, is_banned, last_login_at
        FROM users
        WHERE role = 'admin'
        ORDER BY admin_rank",
    )
    .fetch_all(pool)
    .await?;
    Ok(admins)
}

/// Grant the admin role, creating the account if needed. Admins may sign in
/// from outside the institution domain.
#[tracing::instrument(skip(pool, time_source))]
pub async fn add_admin(
    admin_id: &UserId,
    email: &str,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<(), StoreError> {
    require_admin(admin_id, pool).await?;
    let email = normalize_email(email);
    if !requests::is_valid_email(&email) {
        return Err(StoreError::InvalidEmail(email));
    }
    super::provision_user(&email, Role::Admin, pool, time_source).await?;
    Ok(())
}

/// Demote an administrator. Only admins added after the requester can be
/// demoted by them.
#[tracing::instrument(skip(pool))]
pub async fn remove_admin(
    admin_id: &UserId,
    target_id: &UserId,
    pool: &PgPool,
) -> Result<(), StoreError> {
    let admins = list_admins(admin_id, pool).await?;
    let position = |id: &UserId| admins.iter().position(|a| a.id == *id);
    let requester = position(admin_id).ok_or(StoreError::RequiresAdmin)?;
    let target = position(target_id).ok_or(StoreError::UserNotFound)?;
    if target <= requester {
        return Err(StoreError::RequiresAdmin);
    }
    sqlx::query(
        "UPDATE users SET role = 'user', admin_rank = NULL WHERE id = $1",
    )
    .bind(target_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// The latest cancellation records, administrative events included.
#[tracing::instrument(skip(pool))]
pub async fn list_audit(
    admin_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::CancellationRecord>, StoreError> {
    require_admin(admin_id, pool).await?;
    let records = sqlx::query_as::<_, responses::CancellationRecord>(
        "SELECT * FROM cancellation_records
        ORDER BY created_at DESC
        LIMIT $1",
    )
    .bind(AUDIT_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Bookings made by other people.
#[tracing::instrument(skip(pool, time_source))]
pub async fn list_admin_bookings(
    admin_id: &UserId,
    mode: AdminBookingsMode,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Vec<responses::AdminBooking>, StoreError> {
    require_admin(admin_id, pool).await?;
    let now = time_source.now();
    let select = "SELECT
            b.id, b.court_id, c.name AS court_name, b.start_at, b.end_at,
            b.status, u.email AS creator_email
        FROM bookings b
        JOIN courts c ON c.id = b.court_id
        JOIN users u ON u.id = b.creator_id
        WHERE b.creator_id <> $1";
    let bookings = match mode {
        AdminBookingsMode::Upcoming => {
            sqlx::query_as::<_, responses::AdminBooking>(&format!(
                "{select}
                    AND b.status IN ('pending', 'confirmed')
                    AND b.start_at >= $2
                ORDER BY b.start_at"
            ))
            .bind(admin_id)
            .bind((now + slots::MIN_LEAD_TIME).to_sqlx())
            .fetch_all(pool)
            .await?
        }
        AdminBookingsMode::Current => {
            sqlx::query_as::<_, responses::AdminBooking>(&format!(
                "{select}
                    AND b.start_at <= $2
                    AND b.end_at >= $3
                ORDER BY b.start_at"
            ))
            .bind(admin_id)
            .bind((now + CURRENT_WINDOW).to_sqlx())
            .bind((now - CURRENT_WINDOW).to_sqlx())
            .fetch_all(pool)
            .await?
        }
        AdminBookingsMode::All => {
            sqlx::query_as::<_, responses::AdminBooking>(&format!(
                "{select}
                ORDER BY b.start_at DESC
                LIMIT $2"
            ))
            .bind(admin_id)
            .bind(ALL_BOOKINGS_LIMIT)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(bookings)
}

/// Everyone involved in a booking, the creator included.
#[tracing::instrument(skip(pool))]
pub async fn booking_participants(
    admin_id: &UserId,
    booking_id: &BookingId,
    pool: &PgPool,
) -> Result<Vec<String>, StoreError> {
    require_admin(admin_id, pool).await?;
    let mut tx = pool.begin().await?;
    // surface a missing booking instead of an empty list
    booking::read_booking_tx(booking_id, false, &mut tx).await?;
    let emails = booking::booking_recipients_tx(booking_id, &mut tx).await?;
    tx.commit().await?;
    Ok(emails)
}

#[tracing::instrument(skip(venue, pool, time_source))]
pub async fn admin_stats(
    admin_id: &UserId,
    venue: &Venue,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<responses::AdminStats, StoreError> {
    require_admin(admin_id, pool).await?;
    let now = time_source.now();
    let stats = sqlx::query_as::<_, responses::AdminStats>(
        "SELECT
            (SELECT COUNT(*) FROM users
                WHERE role = 'user' AND NOT is_banned) AS users,
            (SELECT COUNT(*) FROM bookings
                WHERE status IN ('pending', 'confirmed')
                    AND start_at >= $1) AS bookings,
            (SELECT COUNT(*) FROM blocks WHERE end_date >= $2) AS blocks,
            (SELECT COUNT(*) FROM cancellation_records
                WHERE created_at >= $3) AS audits",
    )
    .bind(now.to_sqlx())
    .bind(time_source.today_in(&venue.timezone).to_sqlx())
    .bind((now - AUDIT_STATS_WINDOW).to_sqlx())
    .fetch_one(pool)
    .await?;
    Ok(stats)
}
