pub mod admin;
pub mod booking;
pub mod login;

use actix_identity::Identity;
use actix_web::{
    HttpResponse, Responder, ResponseError, body::BoxBody,
    dev::HttpServiceFactory, get, web,
};
use uuid::Uuid;

use crate::email::{EmailService, EmailTemplate};
use crate::store::{ErrorKind, StoreError, Venue, booking::CancelledBooking};

pub fn api_services() -> impl HttpServiceFactory {
    let scope = web::scope("/api")
        .service(health_check)
        .service(login::logout)
        .service(login::user_profile)
        .service(booking::list_courts)
        .service(booking::list_slots)
        .service(booking::create_booking)
        .service(booking::my_bookings)
        .service(booking::cancel_booking)
        .service(booking::confirm)
        .service(booking::cancellation_banners)
        .service(admin::admin_services());
    #[cfg(feature = "mock-auth")]
    let scope = scope.service(login::test_login);
    scope
}

#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Authentication failed")]
    AuthError(#[source] anyhow::Error),
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error("Forbidden")]
    Forbidden(#[source] anyhow::Error),
    #[error("Not found")]
    NotFound(#[source] anyhow::Error),
    #[error("Conflict")]
    Conflict(#[source] anyhow::Error),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::AuthError(e) => {
                HttpResponse::Unauthorized().body(format!("{self}: {e}"))
            }
            Self::BadRequest(e) => {
                HttpResponse::BadRequest().body(format!("{self}: {e}"))
            }
            Self::Forbidden(e) => {
                HttpResponse::Forbidden().body(format!("{self}: {e}"))
            }
            Self::NotFound(e) => {
                HttpResponse::NotFound().body(format!("{self}: {e}"))
            }
            Self::Conflict(e) => {
                HttpResponse::Conflict().body(format!("{self}: {e}"))
            }
            Self::UnexpectedError(e) => {
                tracing::error!("{e:#}");
                HttpResponse::InternalServerError().body(self.to_string())
            }
        }
    }
}

impl From<StoreError> for APIError {
    fn from(e: StoreError) -> Self {
        match e.kind() {
            ErrorKind::Validation | ErrorKind::Policy => {
                APIError::BadRequest(e.into())
            }
            ErrorKind::Conflict => APIError::Conflict(e.into()),
            ErrorKind::NotFound => APIError::NotFound(e.into()),
            ErrorKind::Forbidden => APIError::Forbidden(e.into()),
            ErrorKind::Transient => APIError::UnexpectedError(e.into()),
        }
    }
}

fn get_user_id(user: &Identity) -> Result<payloads::UserId, APIError> {
    let id_str = user.id().map_err(|e| {
        APIError::AuthError(
            anyhow::Error::from(e).context("Invalid login session"),
        )
    })?;
    // special case: since this is used in so many routes, the user_id is
    // recorded here, but attaches to the span for the api route itself
    tracing::Span::current()
        .record("user_id", tracing::field::display(&id_str));
    Ok(payloads::UserId(
        Uuid::parse_str(&id_str).map_err(anyhow::Error::from)?,
    ))
}

/// Tell everyone involved in a cancelled booking, one message each.
async fn notify_cancelled(
    cancelled: &CancelledBooking,
    template: impl Fn(&CancelledBooking, &Venue) -> EmailTemplate,
    email_service: &EmailService,
    venue: &Venue,
) {
    let template = template(cancelled, venue);
    let report = email_service
        .send_to_each(&cancelled.recipients, &template)
        .await;
    if report.failed > 0 {
        tracing::warn!(
            booking_id = %cancelled.booking.id,
            failed = report.failed,
            "Some cancellation notices were not delivered"
        );
    }
}
