use actix_identity::Identity;
use actix_web::{HttpResponse, get, post, web};
use payloads::{BookingId, requests, responses};
use sqlx::PgPool;
use uuid::Uuid;

use crate::BaseUrl;
use crate::email::{self, EmailService};
use crate::store::{self, StoreError, Venue, booking::TokenId};
use crate::time::TimeSource;

use super::{APIError, get_user_id};

#[tracing::instrument(skip(pool))]
#[get("/courts")]
pub async fn list_courts(
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let courts = store::catalog::list_courts(&pool).await?;
    Ok(HttpResponse::Ok().json(courts))
}

#[tracing::instrument(skip(venue, pool, time_source))]
#[post("/slots")]
pub async fn list_slots(
    query: web::Json<requests::SlotQuery>,
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let slots =
        store::list_available_slots(&query, &venue, &pool, &time_source)
            .await?;
    Ok(HttpResponse::Ok().json(slots))
}

#[tracing::instrument(
    skip(user, details, venue, pool, time_source, email_service, base_url),
    fields(user_id = tracing::field::Empty),
)]
#[post("/create_booking")]
pub async fn create_booking(
    user: Identity,
    details: web::Json<requests::CreateBooking>,
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    email_service: web::Data<EmailService>,
    base_url: web::Data<BaseUrl>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let new_booking = store::create_booking(
        &details,
        &user_id,
        &venue,
        &pool,
        &time_source,
    )
    .await?;

    let booking = &new_booking.created.booking;
    let start = venue.local(booking.start_at);
    for invitation in &new_booking.invitations {
        let template = email::confirmation_request(
            &new_booking.creator_email,
            &booking.court_name,
            &start,
            &base_url.confirm_link(&invitation.token),
        );
        if let Err(e) = email_service
            .send_email(&invitation.email, template)
            .await
        {
            // the booking stands; the player can still be re-invited
            tracing::error!(
                "Failed to send confirmation request to {}: {e:#}",
                invitation.email
            );
        }
    }

    Ok(HttpResponse::Ok().json(new_booking.created))
}

#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[get("/my_bookings")]
pub async fn my_bookings(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let bookings = store::list_my_bookings(&user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(bookings))
}

#[tracing::instrument(
    skip(user, pool, time_source),
    fields(user_id = tracing::field::Empty),
    ret
)]
#[post("/cancel_booking")]
pub async fn cancel_booking(
    user: Identity,
    booking_id: web::Json<BookingId>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    store::cancel_booking(&booking_id, &user_id, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(responses::SuccessMessage {
        message: "Booking cancelled".into(),
    }))
}

/// Target of the link in the invitation email; no session required.
#[tracing::instrument(skip(pool, time_source), ret)]
#[get("/confirm/{token}")]
pub async fn confirm(
    token: web::Path<String>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let token = Uuid::parse_str(&token)
        .map(TokenId)
        .map_err(|_| StoreError::TokenNotFound)?;
    let result =
        store::confirm_with_token(&token, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[tracing::instrument(skip(venue, pool, time_source))]
#[get("/cancellation_banners")]
pub async fn cancellation_banners(
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let banners =
        store::list_cancellation_banners(&venue, &pool, &time_source).await?;
    Ok(HttpResponse::Ok().json(banners))
}
