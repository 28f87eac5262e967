use api::store::{self, StoreError};
use payloads::{BookingStatus, Role, requests};

use test_helpers::{ADMIN, ALICE, BOB, CHARLIE, DAVE, spawn_app};

#[tokio::test]
async fn concurrent_bookings_for_one_slot() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let courts = app.create_courts().await?;
    app.create_players().await?;
    let alice = app.user_id(ALICE).await?;
    let charlie = app.user_id(CHARLIE).await?;

    let start = app.at(app.today().tomorrow()?, 18, 0);
    let end = start + jiff::SignedDuration::from_mins(30);
    let request = |emails: Vec<String>| requests::CreateBooking {
        court_id: courts[0],
        start_at: start,
        end_at: end,
        participants: 2,
        emails,
    };
    let first = request(vec![BOB.into()]);
    let second = request(vec![DAVE.into()]);

    let (a, b) = tokio::join!(
        store::create_booking(
            &first,
            &alice,
            &app.venue,
            &app.db_pool,
            &app.time_source,
        ),
        store::create_booking(
            &second,
            &charlie,
            &app.venue,
            &app.db_pool,
            &app.time_source,
        ),
    );

    let (winner, loser) = match (a, b) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        (a, b) => panic!("expected exactly one booking, got {a:?} and {b:?}"),
    };
    assert!(matches!(loser, StoreError::SlotTaken), "{loser:?}");
    assert_eq!(winner.created.booking.status, BookingStatus::Pending);
    assert_eq!(winner.invitations.len(), 1);

    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM bookings WHERE court_id = $1",
    )
    .bind(courts[0])
    .fetch_one(&app.db_pool)
    .await?;
    assert_eq!(active, 1);

    Ok(())
}

#[tokio::test]
async fn sign_in_normalizes_addresses() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let first = store::sign_in(
        "  Alice@NITW.ac.in ",
        &app.venue,
        &app.db_pool,
        &app.time_source,
    )
    .await?;
    assert_eq!(first.email, ALICE);
    assert_eq!(first.role, Role::User);
    assert_eq!(first.last_login_at, Some(app.time_source.now()));

    let again =
        store::sign_in(ALICE, &app.venue, &app.db_pool, &app.time_source)
            .await?;
    assert_eq!(again.id, first.id);

    let result = store::sign_in(
        "alice@nitw.ac.in.example.com",
        &app.venue,
        &app.db_pool,
        &app.time_source,
    )
    .await;
    assert!(matches!(result, Err(StoreError::OutsideInstitution)));

    Ok(())
}

#[tokio::test]
async fn admins_ranked_by_promotion() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_players().await?;
    let first = app.create_admin().await?;

    // promoting twice keeps the original rank
    let charlie = store::provision_user(
        CHARLIE,
        Role::Admin,
        &app.db_pool,
        &app.time_source,
    )
    .await?;
    store::provision_user(ADMIN, Role::Admin, &app.db_pool, &app.time_source)
        .await?;

    let admins = store::admin::list_admins(&first, &app.db_pool).await?;
    let ids: Vec<_> = admins.iter().map(|admin| admin.id).collect();
    assert_eq!(ids, vec![first, charlie.id]);

    let result =
        store::admin::remove_admin(&charlie.id, &first, &app.db_pool).await;
    assert!(matches!(result, Err(StoreError::RequiresAdmin)));
    let result =
        store::admin::remove_admin(&first, &first, &app.db_pool).await;
    assert!(matches!(result, Err(StoreError::RequiresAdmin)));

    store::admin::remove_admin(&first, &charlie.id, &app.db_pool).await?;
    let charlie = store::read_user(&app.db_pool, &charlie.id).await?;
    assert_eq!(charlie.role, Role::User);

    // a player who was never an admin is not found among them
    let bob = app.user_id(BOB).await?;
    let result = store::admin::remove_admin(&first, &bob, &app.db_pool).await;
    assert!(matches!(result, Err(StoreError::UserNotFound)));

    Ok(())
}
