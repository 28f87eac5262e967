pub mod email;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod time;

use actix_cors::Cors;
use actix_identity::IdentityMiddleware;
use actix_session::{
    SessionMiddleware, config::BrowserSession, storage::CookieSessionStore,
};
use actix_web::cookie::{Key, time::Duration};
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use jiff::tz::TimeZone;
use secrecy::SecretBox;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::email::EmailService;
use crate::store::{Venue, booking::TokenId};
use crate::time::TimeSource;

/// Build the server, but not await it.
///
/// Returns the port that the server has bound to by modifying the config.
pub async fn build(
    config: &mut Config,
    time_source: TimeSource,
    email_service: Arc<EmailService>,
) -> std::io::Result<Server> {
    let secret_key = Key::generate(); // key for signing session cookies
    let db_pool = web::Data::new(
        PgPool::connect(&config.database_url)
            .await
            .map_err(std::io::Error::other)?,
    );
    let time_source = web::Data::new(time_source);
    let email_service = web::Data::from(email_service);
    let venue = web::Data::new(config.venue.clone());
    let base_url = web::Data::new(BaseUrl(config.base_url.clone()));

    let allowed_origins = config.allowed_origins.clone();

    // OS assigns the port if binding to 0
    let listener = TcpListener::bind(format!("{}:{}", config.ip, config.port))?;
    config.port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        let cors = if allowed_origins.iter().any(|origin| origin == "*") {
            // development only
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
        } else {
            allowed_origins.iter().fold(
                Cors::default()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
                |cors, origin| cors.allowed_origin(origin),
            )
        };

        App::new()
            .wrap(cors)
            // Use signed cookie to track user id
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(
                    CookieSessionStore::default(),
                    secret_key.clone(),
                )
                .cookie_name("courtbook".into())
                .session_lifecycle(
                    BrowserSession::default().state_ttl(Duration::days(30)),
                )
                .build(),
            )
            .service(routes::api_services())
            .app_data(db_pool.clone())
            .app_data(time_source.clone())
            .app_data(email_service.clone())
            .app_data(venue.clone())
            .app_data(base_url.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}

/// Public address of the api, used to build links in emails.
#[derive(Debug, Clone)]
pub struct BaseUrl(pub String);

impl BaseUrl {
    pub fn confirm_link(&self, token: &TokenId) -> String {
        format!("{}/api/confirm/{token}", self.0.trim_end_matches('/'))
    }
}

pub struct Config {
    pub database_url: String,
    /// set to "0.0.0.0" for public access, "127.0.0.1" for local dev
    pub ip: String,
    /// set to 0 to get an os-assigned port
    pub port: u16,
    /// List of allowed CORS origins. Use "*" to allow any origin
    /// (development only)
    pub allowed_origins: Vec<String>,
    pub email_api_key: SecretBox<String>,
    pub email_from_address: String,
    pub base_url: String,
    pub venue: Venue,
    pub scheduler_tick: std::time::Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        use std::env::var;

        let required =
            |name: &str| var(name).with_context(|| format!("{name} not set"));

        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timezone_name =
            var("VENUE_TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".into());
        let timezone = TimeZone::get(&timezone_name)
            .with_context(|| format!("Unknown time zone {timezone_name}"))?;
        let email_domain =
            var("EMAIL_DOMAIN").unwrap_or_else(|_| "nitw.ac.in".into());
        let scheduler_tick = match var("SCHEDULER_TICK_SECS") {
            Ok(secs) => std::time::Duration::from_secs(
                secs.parse().context("SCHEDULER_TICK_SECS is not a number")?,
            ),
            Err(_) => std::time::Duration::from_secs(60),
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            ip: required("IP_ADDRESS")?,
            port: required("PORT")?.parse().context("PORT is not a number")?,
            allowed_origins,
            email_api_key: SecretBox::new(Box::new(required("EMAIL_API_KEY")?)),
            email_from_address: required("EMAIL_FROM_ADDRESS")?,
            base_url: var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".into()),
            venue: Venue::new(timezone, email_domain),
            scheduler_tick,
        })
    }
}
