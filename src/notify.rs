//! Report delivery by email.
//!
//! The notifier turns a composed report into a subject line and an HTML body
//! through the mail formatter template, then hands the message to a
//! [`MailTransport`]. Delivery problems are recorded as
//! [`NotifyOutcome::SendFailed`] and never raised: by the time the notifier
//! runs, the feeds have been fetched and the items summarized, and losing the
//! email must not undo that.

use crate::api::{AskAsync, mailer_message};
use crate::config::{SmtpSettings, SmtpTls};
use crate::models::{EmailOutput, NotifyOutcome};
use crate::utils::{strip_code_fence, truncate_for_log};
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::{
    AsyncSmtpTransport, AsyncSmtpTransportBuilder, authentication::Credentials,
};
use lettre::{AsyncTransport, Tokio1Executor};
use std::error::Error;
use tracing::{error, info, instrument, warn};

/// Outbound mail transport.
pub trait MailTransport {
    async fn send(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), Box<dyn Error>>;
}

/// [`MailTransport`] over an SMTP relay.
///
/// The relay connection is built per message; a run sends at most one.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    settings: SmtpSettings,
}

impl SmtpTransport {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// Relay builder for `host` secured as the settings ask.
    fn relay(&self, host: &str) -> Result<AsyncSmtpTransportBuilder, Box<dyn Error>> {
        let mut relay = match self.settings.tls_mode() {
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        if let Some(port) = self.settings.port {
            relay = relay.port(port);
        }
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            relay = relay.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(relay)
    }

    fn build_message(
        from: &str,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<Message, Box<dyn Error>> {
        if to.is_empty() {
            return Err("no email recipients configured".into());
        }
        let mut builder = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        for addr in to {
            builder = builder.to(addr.parse::<Mailbox>()?);
        }
        Ok(builder.body(html_body.to_string())?)
    }
}

impl MailTransport for SmtpTransport {
    #[instrument(level = "info", skip_all, fields(recipients = to.len()))]
    async fn send(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), Box<dyn Error>> {
        let host = self
            .settings
            .host
            .as_deref()
            .ok_or("SMTP host is not configured")?;
        let message = Self::build_message(from, to, subject, html_body)?;

        let tls = self.settings.tls_mode();
        self.relay(host)?.build().send(message).await?;
        info!(%host, ?tls, "Email handed to SMTP relay");
        Ok(())
    }
}

/// Parse the formatter reply into an [`EmailOutput`], tolerating a code fence.
pub fn parse_email_output(raw: &str) -> Result<EmailOutput, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

/// Formats and sends the run report.
pub struct Notifier<F, M> {
    formatter: F,
    transport: M,
    from: String,
    recipients: Vec<String>,
}

impl<F, M> Notifier<F, M>
where
    F: AskAsync<Response = String>,
    M: MailTransport,
{
    pub fn new(formatter: F, transport: M, from: String, recipients: Vec<String>) -> Self {
        Self {
            formatter,
            transport,
            from,
            recipients,
        }
    }

    async fn format(&self, report: &str) -> Result<EmailOutput, Box<dyn Error>> {
        let raw = self.formatter.ask(&mailer_message(report)).await?;
        match parse_email_output(&raw) {
            Ok(email) => Ok(email),
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&raw, 300),
                    "Mail formatter returned non-conforming JSON"
                );
                Err(e.into())
            }
        }
    }

    /// Deliver `report`. An absent report is a no-op.
    #[instrument(level = "info", skip_all)]
    pub async fn notify(&self, report: Option<&str>) -> NotifyOutcome {
        let Some(report) = report else {
            info!("No report available; nothing to send");
            return NotifyOutcome::NoReport;
        };

        let email = match self.format(report).await {
            Ok(email) => email,
            Err(e) => {
                error!(error = %e, "Could not format email");
                return NotifyOutcome::SendFailed;
            }
        };

        match self
            .transport
            .send(&self.from, &self.recipients, &email.subject, &email.html_body)
            .await
        {
            Ok(()) => {
                info!(subject = %email.subject, recipients = self.recipients.len(), "Email sent");
                NotifyOutcome::Ok
            }
            Err(e) => {
                error!(error = %e, "Email delivery failed");
                NotifyOutcome::SendFailed
            }
        }
    }
}
