use actix_identity::Identity;
#[cfg(feature = "mock-auth")]
use actix_web::{HttpMessage, HttpRequest};
use actix_web::{HttpResponse, get, post, web};
use payloads::responses;
use sqlx::PgPool;

#[cfg(feature = "mock-auth")]
use crate::store::Venue;
#[cfg(feature = "mock-auth")]
use crate::time::TimeSource;
use crate::store;

use super::{APIError, get_user_id};

/// Stand-in for the external identity provider: sign in as any address the
/// provider would have verified.
#[cfg(feature = "mock-auth")]
#[tracing::instrument(
    skip(details, venue, pool, time_source),
    fields(email = %details.email, user_id = tracing::field::Empty),
    ret,
)]
#[post("/test_login")]
pub async fn test_login(
    request: HttpRequest,
    details: web::Json<payloads::requests::TestLogin>,
    venue: web::Data<Venue>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    let user =
        store::sign_in(&details.email, &venue, &pool, &time_source).await?;
    tracing::Span::current()
        .record("user_id", tracing::field::display(&user.id));
    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| APIError::UnexpectedError(e.into()))?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(skip(user))]
#[post("/logout")]
pub async fn logout(user: Identity) -> Result<HttpResponse, APIError> {
    let _ = get_user_id(&user); // to instrument the user_id, if exists
    user.logout();
    Ok(HttpResponse::Ok().finish())
}

/// A banned account keeps its session but is refused here, so clients
/// notice on their next page load.
#[tracing::instrument(
    skip(user, pool),
    fields(user_id = tracing::field::Empty),
)]
#[get("/user_profile")]
pub async fn user_profile(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let user = store::read_user(&pool, &user_id).await?;
    if user.is_banned {
        return Err(store::StoreError::AccountBanned.into());
    }
    Ok(HttpResponse::Ok().json(responses::UserProfile::from(user)))
}
