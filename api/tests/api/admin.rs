use payloads::{
    AdminBookingsMode, BookingStatus, CooldownPolicy, Role, requests,
};
use reqwest::StatusCode;

use test_helpers::{
    ADMIN, ALICE, BOB, CHARLIE, assert_error_contains, assert_status_code,
    spawn_app,
};

#[tokio::test]
async fn admin_routes_need_the_admin_role() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_players().await?;

    assert_status_code(app.client.list_users().await, StatusCode::FORBIDDEN);
    assert_status_code(app.client.audit().await, StatusCode::FORBIDDEN);
    assert_status_code(app.client.admin_stats().await, StatusCode::FORBIDDEN);
    assert_status_code(
        app.client
            .admin_bookings(&requests::AdminBookings {
                mode: AdminBookingsMode::All,
            })
            .await,
        StatusCode::FORBIDDEN,
    );
    assert_status_code(
        app.client
            .add_admin(&requests::AddAdmin {
                email: ALICE.into(),
            })
            .await,
        StatusCode::FORBIDDEN,
    );

    Ok(())
}

#[tokio::test]
async fn admin_cancels_any_booking() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    app.create_admin().await?;
    let created = app.create_pair_booking(courts[0]).await?;
    app.email_service.clear_outbox();

    app.login_admin().await?;
    app.client
        .admin_cancel_booking(&requests::AdminCancelBooking {
            booking_id: created.booking.id,
            reason: Some("Rain".into()),
        })
        .await?;
    assert_eq!(
        app.booking_status(&created.booking.id).await?,
        BookingStatus::Cancelled
    );

    for player in [ALICE, BOB] {
        let sent = app.email_service.sent_to(player);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Booking cancelled by admin");
        assert!(sent[0].text_body.contains("Reason: Rain"));
        assert!(sent[0].text_body.contains("Court A"));
    }

    let audit = app.client.audit().await?;
    assert_eq!(audit[0].reason, "Rain");
    assert_eq!(audit[0].booking_id, Some(created.booking.id));
    assert_eq!(audit[0].original_start, Some(created.booking.start_at));

    let result = app
        .client
        .admin_cancel_booking(&requests::AdminCancelBooking {
            booking_id: created.booking.id,
            reason: None,
        })
        .await;
    assert_status_code(result, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn admin_cancellation_default_reason() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    app.create_admin().await?;
    let created = app.create_pair_booking(courts[0]).await?;

    app.login_admin().await?;
    app.client
        .admin_cancel_booking(&requests::AdminCancelBooking {
            booking_id: created.booking.id,
            reason: Some("   ".into()),
        })
        .await?;
    assert_eq!(app.client.audit().await?[0].reason, "Admin cancelled");

    Ok(())
}

#[tokio::test]
async fn admin_cancellation_respects_lead_time() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    app.create_admin().await?;
    let created = app.create_pair_booking(courts[0]).await?;

    app.set_time(
        created.booking.start_at - jiff::SignedDuration::from_mins(30),
    );
    app.login_admin().await?;
    let result = app
        .client
        .admin_cancel_booking(&requests::AdminCancelBooking {
            booking_id: created.booking.id,
            reason: None,
        })
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn booking_overviews() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    app.create_admin().await?;
    let created = app.create_pair_booking(courts[0]).await?;

    app.login_admin().await?;
    let upcoming = app
        .client
        .admin_bookings(&requests::AdminBookings {
            mode: AdminBookingsMode::Upcoming,
        })
        .await?;
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, created.booking.id);
    assert_eq!(upcoming[0].creator_email, ALICE);

    let current = app
        .client
        .admin_bookings(&requests::AdminBookings {
            mode: AdminBookingsMode::Current,
        })
        .await?;
    assert!(current.is_empty());

    app.set_time(
        created.booking.start_at - jiff::SignedDuration::from_mins(30),
    );
    let current = app
        .client
        .admin_bookings(&requests::AdminBookings {
            mode: AdminBookingsMode::Current,
        })
        .await?;
    assert_eq!(current.len(), 1);

    let participants = app
        .client
        .booking_participants(&created.booking.id)
        .await?;
    assert_eq!(participants, vec![ALICE.to_string(), BOB.to_string()]);

    let result = app
        .client
        .booking_participants(&payloads::BookingId(uuid::Uuid::new_v4()))
        .await;
    assert_status_code(result, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn manage_players() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_players().await?;
    let admin_id = app.create_admin().await?;
    let alice_id = app.user_id(ALICE).await?;

    app.login_admin().await?;
    app.client
        .update_user(&requests::UpdateUser {
            user_id: alice_id,
            cooldown_policy: Some(CooldownPolicy::OneDay),
            is_banned: None,
        })
        .await?;

    let users = app.client.list_users().await?;
    assert_eq!(users.len(), 7);
    let alice = users.iter().find(|user| user.id == alice_id).unwrap();
    assert_eq!(alice.cooldown_policy, CooldownPolicy::OneDay);
    assert!(!alice.is_banned);
    assert!(alice.last_login_at.is_some());
    assert!(users.iter().any(|user| user.id == admin_id));

    let result = app
        .client
        .update_user(&requests::UpdateUser {
            user_id: payloads::UserId(uuid::Uuid::new_v4()),
            cooldown_policy: None,
            is_banned: Some(true),
        })
        .await;
    assert_status_code(result, StatusCode::NOT_FOUND);

    let stats = app.client.admin_stats().await?;
    assert_eq!(stats.users, 6);
    assert_eq!(stats.bookings, 0);
    assert_eq!(stats.blocks, 0);

    Ok(())
}

#[tokio::test]
async fn manage_admins() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_players().await?;
    app.create_admin().await?;
    let second = "deputy@example.com";

    app.login_admin().await?;
    app.client
        .add_admin(&requests::AddAdmin {
            email: second.into(),
        })
        .await?;
    // promoting an existing player keeps their account
    app.client
        .add_admin(&requests::AddAdmin {
            email: CHARLIE.into(),
        })
        .await?;
    let result = app
        .client
        .add_admin(&requests::AddAdmin {
            email: "not an email".into(),
        })
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    let admins = app.client.list_admins().await?;
    let emails: Vec<&str> =
        admins.iter().map(|admin| admin.email.as_str()).collect();
    assert_eq!(emails.len(), 3);
    assert_eq!(emails[0], ADMIN);
    assert!(admins.iter().all(|admin| admin.role == Role::Admin));

    // the new admin can sign in from outside the institution
    app.login(second).await?;
    assert_eq!(app.client.user_profile().await?.role, Role::Admin);

    // but cannot demote an admin who was there first
    let first_id = app.user_id(ADMIN).await?;
    let result = app.client.remove_admin(&first_id).await;
    assert_error_contains(result, StatusCode::FORBIDDEN, "Administrator");

    app.login_admin().await?;
    let second_id = app.user_id(second).await?;
    app.client.remove_admin(&second_id).await?;
    assert_eq!(app.client.list_admins().await?.len(), 2);

    // once demoted, an outside address can no longer sign in
    let result = app
        .client
        .test_login(&requests::TestLogin {
            email: second.into(),
        })
        .await;
    assert_status_code(result, StatusCode::FORBIDDEN);

    Ok(())
}
