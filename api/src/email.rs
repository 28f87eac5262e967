//! Outbound notifications.
//!
//! Every message goes to one recipient at a time so a bad address never
//! prevents delivery to the rest of a booking's players. Callers treat
//! delivery as best-effort: failures are logged and never undo a state change
//! that has already been committed.

#[cfg(not(feature = "mock-email"))]
use anyhow::Context;
use anyhow::Result;
use jiff::Zoned;
#[cfg(not(feature = "mock-email"))]
use resend_rs::{Resend, types::CreateEmailBaseOptions};
#[cfg(not(feature = "mock-email"))]
use secrecy::ExposeSecret;
use secrecy::SecretBox;
#[cfg(feature = "mock-email")]
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

pub struct EmailService {
    #[cfg(not(feature = "mock-email"))]
    client: Resend,
    from_address: String,
    #[cfg(feature = "mock-email")]
    outbox: Arc<Mutex<Outbox>>,
}

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl EmailTemplate {
    /// Build a template whose html body mirrors the text body.
    fn plain(subject: &str, text_body: String) -> Self {
        let html_body = text_body
            .trim()
            .split("\n\n")
            .map(|paragraph| {
                format!("<p>{}</p>", paragraph.replace('\n', "<br>"))
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            subject: subject.to_string(),
            html_body,
            text_body,
        }
    }
}

/// Outcome of sending one template to several recipients.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// A message captured by the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

#[cfg(feature = "mock-email")]
#[derive(Default)]
struct Outbox {
    sent: Vec<SentEmail>,
    failing: HashSet<String>,
}

impl EmailService {
    #[cfg(not(feature = "mock-email"))]
    pub fn new(api_key: &SecretBox<String>, from_address: String) -> Self {
        let client = Resend::new(api_key.expose_secret());
        Self {
            client,
            from_address,
        }
    }

    #[cfg(feature = "mock-email")]
    pub fn new(_api_key: &SecretBox<String>, from_address: String) -> Self {
        Self {
            from_address,
            outbox: Arc::new(Mutex::new(Outbox::default())),
        }
    }

    #[tracing::instrument(
        skip(self, template),
        fields(to = %to_email, subject = %template.subject),
    )]
    #[cfg(not(feature = "mock-email"))]
    pub async fn send_email(
        &self,
        to_email: &str,
        template: EmailTemplate,
    ) -> Result<()> {
        let email = CreateEmailBaseOptions::new(
            &self.from_address,
            [to_email],
            &template.subject,
        )
        .with_html(&template.html_body)
        .with_text(&template.text_body);

        self.client
            .emails
            .send(email)
            .await
            .context("Failed to send email via Resend")?;

        tracing::info!("Email sent successfully");
        Ok(())
    }

    #[tracing::instrument(
        skip(self, template),
        fields(to = %to_email, subject = %template.subject),
    )]
    #[cfg(feature = "mock-email")]
    pub async fn send_email(
        &self,
        to_email: &str,
        template: EmailTemplate,
    ) -> Result<()> {
        let mut outbox = self.outbox.lock().unwrap();
        if outbox.failing.contains(to_email) {
            anyhow::bail!("Mock delivery failure for {to_email}");
        }
        tracing::info!(
            "Test mode: Mock email sent to: {} from: {} with subject: {}",
            to_email,
            self.from_address,
            template.subject
        );
        outbox.sent.push(SentEmail {
            to: to_email.to_string(),
            subject: template.subject,
            text_body: template.text_body,
        });
        Ok(())
    }

    /// Send the same template to each recipient individually, logging and
    /// counting failures instead of returning them.
    #[tracing::instrument(
        skip(self, template),
        fields(subject = %template.subject),
    )]
    pub async fn send_to_each(
        &self,
        recipients: &[String],
        template: &EmailTemplate,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for to_email in recipients {
            match self.send_email(to_email, template.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to notify {to_email}: {e:#}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

/// Inspection hooks for the mock transport.
#[cfg(feature = "mock-email")]
impl EmailService {
    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.outbox.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, to_email: &str) -> Vec<SentEmail> {
        self.sent_emails()
            .into_iter()
            .filter(|email| email.to == to_email)
            .collect()
    }

    pub fn clear_outbox(&self) {
        self.outbox.lock().unwrap().sent.clear();
    }

    /// Make every future delivery to this address fail.
    pub fn fail_deliveries_to(&self, to_email: &str) {
        self.outbox
            .lock()
            .unwrap()
            .failing
            .insert(to_email.to_string());
    }
}

fn clock(time: &Zoned) -> String {
    time.strftime("%H:%M").to_string()
}

fn day_and_clock(time: &Zoned) -> String {
    time.strftime("%a %d %b %Y, %H:%M").to_string()
}

/// Invitation for a player to confirm their place in a new booking.
pub fn confirmation_request(
    creator_email: &str,
    court_name: &str,
    start: &Zoned,
    confirm_link: &str,
) -> EmailTemplate {
    EmailTemplate::plain(
        "Confirm your court booking",
        format!(
            "Hello,

{creator_email} added you to a booking for {court_name} on {}.

Please confirm within 60 minutes:
{confirm_link}

Unconfirmed bookings are cancelled automatically 5 minutes before they start.",
            day_and_clock(start)
        ),
    )
}

pub fn booking_reminder(court_name: &str, start: &Zoned) -> EmailTemplate {
    EmailTemplate::plain(
        "Booking reminder",
        format!(
            "Reminder: your booking for {court_name} starts at {}.

Please reach the venue 10 minutes early.",
            clock(start)
        ),
    )
}

pub fn still_pending_notice(court_name: &str, start: &Zoned) -> EmailTemplate {
    EmailTemplate::plain(
        "Booking still pending confirmation",
        format!(
            "Your booking for {court_name} at {} is still pending.

Not all participants have confirmed yet. Unless everyone confirms, the booking will be cancelled automatically 5 minutes before the start time.",
            clock(start)
        ),
    )
}

pub fn auto_cancelled(court_name: &str, start: &Zoned) -> EmailTemplate {
    EmailTemplate::plain(
        "Booking auto-cancelled",
        format!(
            "Your booking for {court_name} at {} was cancelled because one or more participants did not confirm in time.",
            clock(start)
        ),
    )
}

pub fn cancelled_by_admin(
    court_name: &str,
    start: &Zoned,
    end: &Zoned,
    reason: &str,
) -> EmailTemplate {
    EmailTemplate::plain(
        "Booking cancelled by admin",
        format!(
            "Your court booking has been cancelled by an administrator.

Court: {court_name}
Start: {}
End: {}
Reason: {reason}

We apologize for the inconvenience.",
            day_and_clock(start),
            day_and_clock(end)
        ),
    )
}

pub fn cancelled_by_block(
    court_name: &str,
    start: &Zoned,
    end: &Zoned,
    reason: Option<&str>,
) -> EmailTemplate {
    EmailTemplate::plain(
        "Booking cancelled: court unavailable",
        format!(
            "{court_name} has been closed for {} to {}, so your booking was cancelled.
{}
We apologize for the inconvenience.",
            day_and_clock(start),
            clock(end),
            reason.map(|r| format!("\nReason: {r}\n")).unwrap_or_default()
        ),
    )
}
