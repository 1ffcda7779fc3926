use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};

use super::{MailTransport, ReminderEmail};
use crate::appsettings::MailSettings;

/// Delivers reminder emails through an SMTP relay over TLS.
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// `None` when no SMTP host is configured.
    pub fn from_settings(settings: &MailSettings) -> anyhow::Result<Option<Self>> {
        let Some(host) = settings.smtp_host.as_deref() else {
            return Ok(None);
        };

        let credentials = match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => {
                Some(Credentials::new(username.clone(), password.clone()))
            }
            (None, None) => None,
            _ => anyhow::bail!("SMTP username and password must be configured together"),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("Invalid SMTP host {host}"))?;
        if let Some(port) = settings.smtp_port {
            builder = builder.port(port);
        }
        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }

        log::info!("Using SMTP relay [host = {}]", host);
        Ok(Some(Self {
            transport: builder.build(),
        }))
    }
}

fn mailbox(address: &str) -> anyhow::Result<Mailbox> {
    address
        .parse()
        .with_context(|| format!("Invalid email address {address:?}"))
}

fn build_message(email: ReminderEmail) -> anyhow::Result<Message> {
    let message = Message::builder()
        .from(mailbox(&email.from)?)
        .reply_to(mailbox(&email.reply_to)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject)
        .multipart(MultiPart::alternative_plain_html(email.body, email.html))?;

    Ok(message)
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(&self, email: ReminderEmail) -> anyhow::Result<()> {
        let to = email.to.clone();
        let message = build_message(email)?;

        self.transport
            .send(message)
            .await
            .with_context(|| format!("SMTP delivery to {to} failed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> ReminderEmail {
        ReminderEmail {
            from: "Expense Mind <reminders@moneymanagement.com>".to_owned(),
            to: to.to_owned(),
            reply_to: "no-reply@moneymanagement.com".to_owned(),
            subject: "🔔 Reminder: Pay rent".to_owned(),
            body: "Hello linh!".to_owned(),
            html: "<h2>Hello linh!</h2>".to_owned(),
        }
    }

    #[test]
    fn message_carries_addresses_and_both_bodies() {
        let message = build_message(email("linh@example.com")).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(formatted.contains("To: linh@example.com"), "{formatted}");
        assert!(formatted.contains("Reply-To: no-reply@moneymanagement.com"), "{formatted}");
        assert!(formatted.contains("multipart/alternative"), "{formatted}");
        assert!(formatted.contains("Hello linh!"), "{formatted}");
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let error = build_message(email("not an address")).unwrap_err();

        assert!(error.to_string().contains("not an address"), "error = {error}");
    }

    #[test]
    fn transport_is_disabled_without_host() {
        assert!(
            SmtpMailTransport::from_settings(&MailSettings::default())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn credentials_must_come_in_pairs() {
        let settings = MailSettings {
            smtp_host: Some("smtp.gmail.com".to_owned()),
            username: Some("reminders@moneymanagement.com".to_owned()),
            ..MailSettings::default()
        };

        assert!(SmtpMailTransport::from_settings(&settings).is_err());
    }

    #[tokio::test]
    async fn configured_host_builds_a_transport() {
        let settings = MailSettings {
            smtp_host: Some("smtp.gmail.com".to_owned()),
            username: Some("reminders@moneymanagement.com".to_owned()),
            password: Some("app-password".to_owned()),
            ..MailSettings::default()
        };

        assert!(SmtpMailTransport::from_settings(&settings).unwrap().is_some());
    }
}
