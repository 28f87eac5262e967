use api::scheduler;
use jiff::SignedDuration;
use payloads::BookingStatus;
use reqwest::StatusCode;

use test_helpers::{ALICE, BOB, CHARLIE, assert_error_contains, spawn_app};

const REMINDER: &str = "Booking reminder";
const STILL_PENDING: &str = "Booking still pending confirmation";
const AUTO_CANCELLED: &str = "Booking auto-cancelled";

fn count(subjects: &[String], subject: &str) -> usize {
    subjects.iter().filter(|s| s.as_str() == subject).count()
}

#[tokio::test]
async fn confirmed_bookings_reminded_once() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let created = app.create_pair_booking(courts[0]).await?;
    app.confirm_all(&[BOB]).await?;

    // too early
    app.set_time(created.booking.start_at - SignedDuration::from_mins(70));
    app.run_scheduler().await?;
    assert_eq!(count(&app.subjects_sent_to(ALICE), REMINDER), 0);

    app.set_time(created.booking.start_at - SignedDuration::from_mins(60));
    app.run_scheduler().await?;
    app.run_scheduler().await?;

    for player in [ALICE, BOB] {
        assert_eq!(count(&app.subjects_sent_to(player), REMINDER), 1);
    }
    let reminded = sqlx::query_scalar::<_, bool>(
        "SELECT reminder_sent FROM bookings WHERE id = $1",
    )
    .bind(created.booking.id)
    .fetch_one(&app.db_pool)
    .await?;
    assert!(reminded);

    // a later sweep inside the window still does not repeat it
    app.set_time(created.booking.start_at - SignedDuration::from_mins(56));
    app.run_scheduler().await?;
    assert_eq!(count(&app.subjects_sent_to(BOB), REMINDER), 1);
    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::Confirmed
    );

    Ok(())
}

#[tokio::test]
async fn reminder_retried_when_nothing_delivered() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let created = app.create_pair_booking(courts[0]).await?;
    app.confirm_all(&[BOB]).await?;

    app.email_service.fail_deliveries_to(ALICE);
    app.email_service.fail_deliveries_to(BOB);
    app.set_time(created.booking.start_at - SignedDuration::from_mins(60));
    app.run_scheduler().await?;

    let reminded = sqlx::query_scalar::<_, bool>(
        "SELECT reminder_sent FROM bookings WHERE id = $1",
    )
    .bind(created.booking.id)
    .fetch_one(&app.db_pool)
    .await?;
    assert!(!reminded);

    Ok(())
}

#[tokio::test]
async fn one_failed_address_does_not_block_the_rest() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let created = app.create_pair_booking(courts[0]).await?;
    app.confirm_all(&[BOB]).await?;

    app.email_service.fail_deliveries_to(ALICE);
    app.set_time(created.booking.start_at - SignedDuration::from_mins(60));
    app.run_scheduler().await?;
    app.run_scheduler().await?;

    assert_eq!(count(&app.subjects_sent_to(BOB), REMINDER), 1);
    assert_eq!(count(&app.subjects_sent_to(ALICE), REMINDER), 0);

    Ok(())
}

#[tokio::test]
async fn pending_bookings_nudged_every_sweep() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let created = app.create_pair_booking(courts[0]).await?;

    app.set_time(created.booking.start_at - SignedDuration::from_mins(60));
    app.run_scheduler().await?;
    app.run_scheduler().await?;

    for player in [ALICE, BOB] {
        let subjects = app.subjects_sent_to(player);
        assert_eq!(count(&subjects, STILL_PENDING), 2);
        assert_eq!(count(&subjects, REMINDER), 0);
    }

    Ok(())
}

#[tokio::test]
async fn unconfirmed_bookings_auto_cancelled() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let start = app.at(app.today().tomorrow()?, 18, 0);
    let created = app.book(courts[0], start, 45, &[BOB, CHARLIE]).await?;
    app.confirm_all(&[BOB]).await?;

    // just before the cutoff nothing happens
    app.set_time(start - SignedDuration::from_mins(6));
    app.run_scheduler().await?;
    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::Pending
    );

    app.set_time(start - SignedDuration::from_mins(4));
    app.run_scheduler().await?;
    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::AutoCancelled
    );

    // only the player who never confirmed is told
    assert_eq!(count(&app.subjects_sent_to(CHARLIE), AUTO_CANCELLED), 1);
    assert_eq!(count(&app.subjects_sent_to(BOB), AUTO_CANCELLED), 0);
    assert_eq!(count(&app.subjects_sent_to(ALICE), AUTO_CANCELLED), 0);

    // a second sweep finds nothing to do
    app.run_scheduler().await?;
    assert_eq!(count(&app.subjects_sent_to(CHARLIE), AUTO_CANCELLED), 1);

    // advertised from five minutes before the start
    let banners = app.client.cancellation_banners().await?;
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].booking_id, created.booking.id);

    // until ten minutes before the end
    app.set_time(created.booking.end_at - SignedDuration::from_mins(10));
    assert!(app.client.cancellation_banners().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn overlapping_sweeps_auto_cancel_once() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let start = app.at(app.today().tomorrow()?, 18, 0);
    let created = app.book(courts[0], start, 45, &[BOB, CHARLIE]).await?;
    app.confirm_all(&[BOB]).await?;

    app.set_time(start - SignedDuration::from_mins(4));
    let sweep = || {
        scheduler::schedule_tick(
            &app.db_pool,
            &app.time_source,
            &app.email_service,
            &app.venue,
        )
    };
    let (a, b, c) = tokio::join!(sweep(), sweep(), sweep());
    a?;
    b?;
    c?;

    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::AutoCancelled
    );
    let records = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM cancellation_records
        WHERE booking_id = $1 AND reason = $2",
    )
    .bind(created.booking.id)
    .bind(scheduler::AUTO_CANCEL_REASON)
    .fetch_one(&app.db_pool)
    .await?;
    assert_eq!(records, 1);

    assert_eq!(count(&app.subjects_sent_to(CHARLIE), AUTO_CANCELLED), 1);
    assert_eq!(count(&app.subjects_sent_to(BOB), AUTO_CANCELLED), 0);
    assert_eq!(count(&app.subjects_sent_to(ALICE), AUTO_CANCELLED), 0);

    Ok(())
}

#[tokio::test]
async fn auto_cancelled_bookings_count_as_played() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let created = app.create_pair_booking(courts[0]).await?;

    app.set_time(created.booking.start_at - SignedDuration::from_mins(4));
    app.run_scheduler().await?;
    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::AutoCancelled
    );

    let wednesday = app.today().tomorrow()?;
    app.login_bob().await?;
    let result = app
        .book(courts[1], app.at(wednesday, 18, 0), 30, &[CHARLIE])
        .await;
    assert_error_contains(
        result,
        StatusCode::BAD_REQUEST,
        "You can book again",
    );

    // and keep their slot
    app.set_time(created.booking.start_at - SignedDuration::from_hours(2));
    app.login(CHARLIE).await?;
    let result = app
        .book(courts[0], created.booking.start_at, 30, &[test_helpers::DAVE])
        .await;
    assert_error_contains(result, StatusCode::CONFLICT, "Slot already taken");

    Ok(())
}

#[tokio::test]
async fn cancelled_bookings_left_alone() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let created = app.create_pair_booking(courts[0]).await?;
    app.client.cancel_booking(&created.booking.id).await?;
    app.email_service.clear_outbox();

    app.set_time(created.booking.start_at - SignedDuration::from_mins(60));
    app.run_scheduler().await?;
    app.set_time(created.booking.start_at - SignedDuration::from_mins(4));
    app.run_scheduler().await?;

    assert!(app.email_service.sent_emails().is_empty());
    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::Cancelled
    );

    Ok(())
}
