//! Who may play in a new booking.
//!
//! Runs inside the creation transaction, before anything is written. Invite
//! problems are collected and reported together; the per-player checks stop
//! at the first refusal.

use std::collections::HashSet;

use jiff::{SignedDuration, Timestamp};
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    CooldownPolicy,
    requests::{is_valid_email, normalize_email},
};
use sqlx::{Postgres, Transaction};

use super::{StoreError, User, Venue};

const DAY: SignedDuration = SignedDuration::from_hours(24);

/// Why a single invited address cannot be used, judged without the
/// database.
fn invite_problem(
    email: &str,
    creator_email: &str,
    seen: &HashSet<String>,
    venue: &Venue,
) -> Option<String> {
    if !is_valid_email(email) {
        return Some("not a valid email address".into());
    }
    if !venue.accepts_domain(email) {
        return Some(format!("must be an {} address", venue.email_domain));
    }
    if email == creator_email {
        return Some("you are already part of the booking".into());
    }
    if seen.contains(email) {
        return Some("listed more than once".into());
    }
    None
}

/// Resolve invited addresses to registered accounts.
///
/// Every offending address is reported in a single
/// [`StoreError::InvalidInvites`].
#[tracing::instrument(
    skip(creator, venue, tx),
    fields(creator = %creator.email),
)]
pub async fn validate_invites(
    creator: &User,
    emails: &[String],
    venue: &Venue,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Vec<User>, StoreError> {
    let creator_email = normalize_email(&creator.email);
    let mut seen = HashSet::new();
    let mut problems = Vec::new();
    let mut invitees = Vec::with_capacity(emails.len());

    for raw in emails {
        let email = normalize_email(raw);
        if let Some(problem) =
            invite_problem(&email, &creator_email, &seen, venue)
        {
            problems.push(format!("{email}: {problem}"));
            seen.insert(email);
            continue;
        }
        seen.insert(email.clone());

        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = $1",
        )
        .bind(&email)
        .fetch_optional(&mut **tx)
        .await?;
        match user {
            Some(user) => invitees.push(user),
            None => problems.push(format!("{email}: not a registered user")),
        }
    }

    if !problems.is_empty() {
        return Err(StoreError::InvalidInvites(problems));
    }
    Ok(invitees)
}

/// Whole days, rounded up, until a player whose last game started at
/// `last_start` may play again. `None` once the cooldown has passed.
pub fn cooldown_days_left(
    last_start: Timestamp,
    policy: CooldownPolicy,
    now: Timestamp,
) -> Option<i64> {
    let next_allowed = last_start + DAY * policy.days() as i32;
    if now >= next_allowed {
        return None;
    }
    let remaining = next_allowed.duration_since(now).as_nanos();
    let day = DAY.as_nanos();
    Some(((remaining + day - 1) / day) as i64)
}

/// Ban, cooldown and conflict checks for every player of a new booking.
///
/// `players` starts with the creator, followed by the invitees in request
/// order.
#[tracing::instrument(skip(players, tx))]
pub async fn check_participants(
    players: &[User],
    start: Timestamp,
    end: Timestamp,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    for (i, player) in players.iter().enumerate() {
        let is_creator = i == 0;

        if player.is_banned {
            return Err(StoreError::Banned(player.email.clone()));
        }

        // auto-cancelled bookings count as played
        let last_start = sqlx::query_scalar::<_, SqlxTs>(
            "SELECT b.start_at FROM bookings b
            JOIN booking_participants p ON p.booking_id = b.id
            WHERE p.user_id = $1
                AND b.status IN ('confirmed', 'auto_cancelled')
            ORDER BY b.start_at DESC
            LIMIT 1",
        )
        .bind(player.id)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(last_start) = last_start
            && let Some(days_left) = cooldown_days_left(
                last_start.to_jiff(),
                player.cooldown_policy,
                now,
            )
        {
            let who = if is_creator {
                "You".to_string()
            } else {
                player.email.clone()
            };
            return Err(StoreError::CooldownActive { who, days_left });
        }

        let clash = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM bookings b
                JOIN booking_participants p ON p.booking_id = b.id
                WHERE p.user_id = $1
                    AND b.status IN ('pending', 'confirmed')
                    AND b.start_at < $3
                    AND b.end_at > $2
            )",
        )
        .bind(player.id)
        .bind(start.to_sqlx())
        .bind(end.to_sqlx())
        .fetch_one(&mut **tx)
        .await?;
        if clash {
            return Err(StoreError::ParticipantConflict(player.email.clone()));
        }
    }
    Ok(())
}
