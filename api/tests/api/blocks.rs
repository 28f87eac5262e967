use jiff::civil::Date;
use payloads::{BookingStatus, CourtId, Lot, requests};
use reqwest::StatusCode;

use test_helpers::{
    ALICE, BOB, CHARLIE, DAVE, TestApp, assert_error_contains,
    assert_status_code, spawn_app,
};

fn block(
    court_ids: Vec<CourtId>,
    lots: Vec<Lot>,
    start_date: Date,
    end_date: Date,
    reason: Option<&str>,
) -> requests::CreateBlocks {
    requests::CreateBlocks {
        court_ids,
        lots,
        start_date,
        end_date,
        reason: reason.map(str::to_string),
    }
}

/// Two courts, the players, and a signed-in administrator.
async fn setup(app: &TestApp) -> anyhow::Result<Vec<CourtId>> {
    let courts = app.create_courts().await?;
    app.create_players().await?;
    app.create_admin().await?;
    Ok(courts)
}

#[tokio::test]
async fn only_admins_manage_blocks() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let tuesday = app.today().tomorrow()?;

    let result = app
        .client
        .create_blocks(&block(
            courts,
            vec![Lot::Evening],
            tuesday,
            tuesday,
            None,
        ))
        .await;
    assert_status_code(result, StatusCode::FORBIDDEN);
    assert_status_code(app.client.list_blocks().await, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn block_cancels_covered_bookings() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let tuesday = app.today().tomorrow()?;

    let evening = app.create_pair_booking(courts[0]).await?;
    let morning = app
        .book(courts[0], app.at(tuesday, 7, 0), 30, &[CHARLIE])
        .await?;
    app.email_service.clear_outbox();

    app.login_admin().await?;
    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Evening],
            tuesday,
            tuesday,
            Some(" Tournament "),
        ))
        .await?;
    assert_eq!(result.created.len(), 1);
    assert_eq!(result.cancelled_count, 1);

    assert_eq!(
        app.booking_status(&evening.booking.id).await?,
        BookingStatus::Cancelled
    );
    // the other lot is untouched
    assert_eq!(
        app.booking_status(&morning.booking.id).await?,
        BookingStatus::Pending
    );

    for player in [ALICE, BOB] {
        let sent = app.email_service.sent_to(player);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Booking cancelled: court unavailable");
        assert!(sent[0].text_body.contains("Reason: Tournament"));
    }
    assert!(app.email_service.sent_to(CHARLIE).is_empty());

    let audit = app.client.audit().await?;
    let reasons: Vec<&str> =
        audit.iter().map(|record| record.reason.as_str()).collect();
    assert!(reasons.contains(&"Blocked: Tournament"));
    assert!(reasons.contains(&"Block created on Court A (evening)"));

    // the administrative record is not a banner
    let banners = app.client.cancellation_banners().await?;
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].booking_id, evening.booking.id);

    let blocks = app.client.list_blocks().await?;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].reason.as_deref(), Some("Tournament"));
    assert_eq!(blocks[0].court_name, "Court A");

    Ok(())
}

#[tokio::test]
async fn block_keeps_bookings_already_played() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let today = app.today();

    app.set_time(app.at(today, 5, 0));
    app.login_alice().await?;
    let played = app
        .book(courts[0], app.at(today, 7, 0), 30, &[BOB])
        .await?;
    app.confirm_all(&[BOB]).await?;

    app.set_time(app.at(today, 12, 0));
    app.email_service.clear_outbox();
    app.login_admin().await?;
    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            today,
            today,
            Some("Resurfacing"),
        ))
        .await?;
    assert_eq!(result.created.len(), 1);
    assert_eq!(result.cancelled_count, 0);

    assert_eq!(
        app.booking_status(&played.booking.id).await?,
        BookingStatus::Confirmed
    );
    for player in [ALICE, BOB] {
        assert!(app.email_service.sent_to(player).is_empty());
    }

    // nor can a block reach back before today
    let result = app
        .client
        .create_blocks(&block(
            vec![courts[1]],
            vec![Lot::Morning],
            today.yesterday()?,
            today,
            None,
        ))
        .await;
    assert_error_contains(result, StatusCode::BAD_REQUEST, "before today");

    Ok(())
}

#[tokio::test]
async fn blocked_lots_refuse_bookings() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let tuesday = app.today().tomorrow()?;

    app.login_admin().await?;
    app.client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Evening],
            tuesday,
            tuesday,
            None,
        ))
        .await?;

    app.login_alice().await?;
    let result = app
        .book(courts[0], app.at(tuesday, 19, 0), 30, &[BOB])
        .await;
    assert_error_contains(result, StatusCode::BAD_REQUEST, "blocked");

    // same court in the morning, and another court in the evening
    app.book(courts[0], app.at(tuesday, 7, 0), 30, &[BOB])
        .await?;
    app.login(CHARLIE).await?;
    app.book(courts[1], app.at(tuesday, 19, 0), 30, &[DAVE])
        .await?;

    Ok(())
}

#[tokio::test]
async fn deleting_a_block_reopens_the_court() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let tuesday = app.today().tomorrow()?;
    let booking = app.create_pair_booking(courts[0]).await?;

    app.login_admin().await?;
    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Evening],
            tuesday,
            tuesday,
            None,
        ))
        .await?;
    app.client.delete_block(&result.created[0]).await?;
    assert!(app.client.list_blocks().await?.is_empty());

    let result = app.client.delete_block(&result.created[0]).await;
    assert_status_code(result, StatusCode::NOT_FOUND);

    // cancelled bookings stay cancelled
    assert_eq!(
        app.booking_status(&booking.booking.id).await?,
        BookingStatus::Cancelled
    );

    app.login(CHARLIE).await?;
    app.book(courts[0], app.at(tuesday, 19, 0), 30, &[DAVE])
        .await?;

    Ok(())
}

#[tokio::test]
async fn overlapping_blocks_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let today = app.today();
    let in_days = |days: i64| today.checked_add(jiff::Span::new().days(days));

    app.login_admin().await?;
    app.client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            in_days(3)?,
            in_days(5)?,
            None,
        ))
        .await?;

    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            in_days(5)?,
            in_days(7)?,
            None,
        ))
        .await;
    assert_error_contains(result, StatusCode::BAD_REQUEST, "Overlapping block");

    // the whole request fails, including the court that was free
    let result = app
        .client
        .create_blocks(&block(
            courts.clone(),
            vec![Lot::Morning],
            in_days(4)?,
            in_days(4)?,
            None,
        ))
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);
    assert_eq!(app.client.list_blocks().await?.len(), 1);

    // adjacent ranges and other lots are fine
    app.client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            in_days(6)?,
            in_days(6)?,
            None,
        ))
        .await?;
    let result = app
        .client
        .create_blocks(&block(
            courts,
            vec![Lot::Morning, Lot::Evening],
            in_days(8)?,
            in_days(9)?,
            None,
        ))
        .await?;
    assert_eq!(result.created.len(), 4);
    assert_eq!(app.client.list_blocks().await?.len(), 6);

    Ok(())
}

#[tokio::test]
async fn invalid_block_requests() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = setup(&app).await?;
    let today = app.today();
    let in_days = |days: i64| today.checked_add(jiff::Span::new().days(days));

    app.login_admin().await?;

    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            in_days(2)?,
            in_days(1)?,
            None,
        ))
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            today,
            in_days(31)?,
            None,
        ))
        .await;
    assert_error_contains(result, StatusCode::BAD_REQUEST, "30 days");

    let result = app
        .client
        .create_blocks(&block(vec![], vec![Lot::Morning], today, today, None))
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    let result = app
        .client
        .create_blocks(&block(
            vec![courts[0]],
            vec![Lot::Morning],
            today,
            today,
            Some(&"x".repeat(501)),
        ))
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    let result = app
        .client
        .create_blocks(&block(
            vec![CourtId(uuid::Uuid::new_v4())],
            vec![Lot::Morning],
            today,
            today,
            None,
        ))
        .await;
    assert_status_code(result, StatusCode::NOT_FOUND);

    assert!(app.client.list_blocks().await?.is_empty());

    Ok(())
}
