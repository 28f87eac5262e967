use actix_identity::Identity;
use actix_web::{HttpResponse, dev::HttpServiceFactory, get, post, web};
use payloads::{BlockId, BookingId, UserId, requests, responses};
use sqlx::PgPool;

use crate::email::{self, EmailService};
use crate::store::{self, Venue};
use crate::time::TimeSource;

use super::{APIError, get_user_id, notify_cancelled};

pub fn admin_services() -> impl HttpServiceFactory {
    web::scope("/admin")
        .service(create_blocks)
        .service(list_blocks)
        .service(delete_block)
        .service(cancel_booking)
        .service(bookings)
        .service(booking_participants)
        .service(list_users)
        .service(update_user)
        .service(list_admins)
        .service(add_admin)
        .service(remove_admin)
        .service(audit)
        .service(stats)
}

#[tracing::instrument(
    skip(user, details, venue, pool, time_source, email_service),
    fields(user_id = tracing::field::Empty),
)]
#[post("/create_blocks")]
pub async fn create_blocks(
    user: Identity,
    details: web::Json<requests::CreateBlocks>,
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    email_service: web::Data<EmailService>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let creation =
        store::create_blocks(&details, &user_id, &venue, &pool, &time_source)
            .await?;

    let block_reason = details
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty());
    for cancelled in &creation.cancelled {
        notify_cancelled(
            cancelled,
            |cancelled, venue| {
                email::cancelled_by_block(
                    &cancelled.booking.court_name,
                    &venue.local(cancelled.booking.start_at),
                    &venue.local(cancelled.booking.end_at),
                    block_reason,
                )
            },
            &email_service,
            &venue,
        )
        .await;
    }

    Ok(HttpResponse::Ok().json(creation.result))
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[get("/blocks")]
pub async fn list_blocks(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let blocks = store::list_blocks(&user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(blocks))
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[post("/delete_block")]
pub async fn delete_block(
    user: Identity,
    block_id: web::Json<BlockId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::delete_block(&user_id, &block_id, &pool).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(
    skip(user, details, venue, pool, time_source, email_service),
    fields(user_id = tracing::field::Empty),
)]
#[post("/cancel_booking")]
pub async fn cancel_booking(
    user: Identity,
    details: web::Json<requests::AdminCancelBooking>,
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    email_service: web::Data<EmailService>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let cancelled = store::admin_cancel_booking(
        &details,
        &user_id,
        &pool,
        &time_source,
    )
    .await?;
    notify_cancelled(
        &cancelled,
        |cancelled, venue| {
            email::cancelled_by_admin(
                &cancelled.booking.court_name,
                &venue.local(cancelled.booking.start_at),
                &venue.local(cancelled.booking.end_at),
                &cancelled.reason,
            )
        },
        &email_service,
        &venue,
    )
    .await;
    Ok(HttpResponse::Ok().json(responses::SuccessMessage {
        message: "Booking cancelled".into(),
    }))
}

#[tracing::instrument(
    skip(user, pool, time_source),
    fields(user_id = tracing::field::Empty),
)]
#[post("/bookings")]
pub async fn bookings(
    user: Identity,
    details: web::Json<requests::AdminBookings>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let bookings = store::admin::list_admin_bookings(
        &user_id,
        details.mode,
        &pool,
        &time_source,
    )
    .await?;
    Ok(HttpResponse::Ok().json(bookings))
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[post("/booking_participants")]
pub async fn booking_participants(
    user: Identity,
    booking_id: web::Json<BookingId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let emails =
        store::admin::booking_participants(&user_id, &booking_id, &pool)
            .await?;
    Ok(HttpResponse::Ok().json(emails))
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[get("/users")]
pub async fn list_users(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let users = store::admin::list_users(&user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[post("/update_user")]
pub async fn update_user(
    user: Identity,
    details: web::Json<requests::UpdateUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::admin::update_user(&user_id, &details, &pool).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[get("/admins")]
pub async fn list_admins(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let admins = store::admin::list_admins(&user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(admins))
}

#[tracing::instrument(
    skip(user, pool, time_source),
    fields(user_id = tracing::field::Empty),
)]
#[post("/add_admin")]
pub async fn add_admin(
    user: Identity,
    details: web::Json<requests::AddAdmin>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::admin::add_admin(&user_id, &details.email, &pool, &time_source)
        .await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[post("/remove_admin")]
pub async fn remove_admin(
    user: Identity,
    target: web::Json<UserId>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::admin::remove_admin(&user_id, &target, &pool).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[get("/audit")]
pub async fn audit(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let records = store::admin::list_audit(&user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[tracing::instrument(
    skip(user, venue, pool, time_source),
    fields(user_id = tracing::field::Empty),
)]
#[get("/stats")]
pub async fn stats(
    user: Identity,
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let stats =
        store::admin::admin_stats(&user_id, &venue, &pool, &time_source)
            .await?;
    Ok(HttpResponse::Ok().json(stats))
}
