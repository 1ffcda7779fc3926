use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;

use super::{NotificationError, NotificationSender};
use crate::{
    appsettings::MailSettings,
    models::{Reminder, User, UserId},
    storage::UserStorage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEmail {
    pub from: String,
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
    pub html: String,
}

impl ReminderEmail {
    pub fn render(
        settings: &MailSettings,
        user: &User,
        to: &str,
        reminder: &Reminder,
        tz: Tz,
    ) -> Self {
        let date = reminder.date.with_timezone(&tz).format("%-d/%-m/%Y").to_string();
        let body = format!(
            "Hello {username}!\n\
             \n\
             This is a reminder for your scheduled task:\n\
             \n\
             {title}\n\
             Date: {date}\n\
             Time: {time}\n\
             Repeat: {repeat}\n\
             \n\
             This is an automated reminder from Expense Mind.\n\
             Please do not reply to this email.\n",
            username = user.username,
            title = reminder.title,
            time = reminder.time,
            repeat = reminder.repeat,
        );
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: linear-gradient(135deg, #ff9c9c, #ff6b6b);
              padding: 20px; text-align: center; color: white;">
    <h1 style="margin: 0;">💰 Expense Mind</h1>
    <p style="margin: 5px 0 0 0; font-size: 16px;">Reminder Notification</p>
  </div>
  <div style="padding: 20px; background: #f9f9f9;">
    <h2 style="color: #333;">Hello {username}!</h2>
    <p style="font-size: 16px; color: #555;">This is a reminder for your scheduled task:</p>
    <div style="background: white; padding: 15px; border-radius: 8px;
                border-left: 4px solid #ff6b6b; margin: 15px 0;">
      <h3 style="color: #ff6b6b; margin: 0 0 10px 0;">{title}</h3>
      <p style="margin: 5px 0;"><strong>📅 Date:</strong> {date}</p>
      <p style="margin: 5px 0;"><strong>⏰ Time:</strong> {time}</p>
      <p style="margin: 5px 0;"><strong>🔄 Repeat:</strong> {repeat}</p>
    </div>
    <p style="font-size: 14px; color: #888;">
      This is an automated reminder from Expense Mind.
      <br>Please do not reply to this email.
    </p>
  </div>
</div>
"#,
            username = escape_html(&user.username),
            title = escape_html(&reminder.title),
            time = reminder.time,
            repeat = reminder.repeat,
        );

        Self {
            from: settings.from.clone(),
            to: to.to_owned(),
            reply_to: settings.reply_to.clone(),
            subject: format!("🔔 Reminder: {}", reminder.title),
            body,
            html,
        }
    }
}

// User-provided text ends up inside the html body.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, email: ReminderEmail) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of a mail server.
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn deliver(&self, email: ReminderEmail) -> anyhow::Result<()> {
        log::info!(
            "Sending email [to = {}, subject = {:?}]\n{}",
            email.to,
            email.subject,
            email.body
        );
        Ok(())
    }
}

pub struct MailNotificationSender<T: MailTransport> {
    user_store: Arc<dyn UserStorage>,
    transport: T,
    settings: MailSettings,
    tz: Tz,
}

impl<T: MailTransport> MailNotificationSender<T> {
    pub fn new(
        user_store: Arc<dyn UserStorage>,
        transport: T,
        settings: MailSettings,
        tz: Tz,
    ) -> Self {
        Self {
            user_store,
            transport,
            settings,
            tz,
        }
    }
}

#[async_trait]
impl<T: MailTransport> NotificationSender for MailNotificationSender<T> {
    async fn send(&self, user_id: UserId, reminder: &Reminder) -> Result<(), NotificationError> {
        let user = self
            .user_store
            .get(user_id)
            .await
            .map_err(NotificationError::Storage)?
            .ok_or(NotificationError::UnknownUser(user_id))?;

        let to = user
            .email
            .as_deref()
            .ok_or(NotificationError::NoEmailConfigured(user_id))?;

        let email = ReminderEmail::render(&self.settings, &user, to, reminder, self.tz);
        self.transport
            .deliver(email)
            .await
            .map_err(NotificationError::Transport)?;

        log::info!(
            "Reminder email sent [reminder_id = {}, user_id = {}]",
            reminder.id,
            user_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        models::{NewUser, RepeatRule},
        storage::InMemoryUserStorage,
    };

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<ReminderEmail>>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, email: ReminderEmail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    fn reminder(user_id: UserId) -> Reminder {
        let date = Utc.with_ymd_and_hms(2025, 2, 28, 17, 0, 0).unwrap();
        Reminder {
            id: 9,
            title: "Pay rent".to_owned(),
            date,
            time: "09:00".parse().unwrap(),
            repeat: RepeatRule::EveryMonth,
            user_id,
            created_at: date,
            updated_at: date,
        }
    }

    async fn sender_with_user(
        email: Option<&str>,
    ) -> (MailNotificationSender<RecordingTransport>, RecordingTransport, UserId) {
        let users = Arc::new(InMemoryUserStorage::new());
        let user = users
            .insert(NewUser {
                username: "linh".to_owned(),
                email: email.map(str::to_owned),
            })
            .await
            .unwrap();
        let transport = RecordingTransport::default();
        let sender = MailNotificationSender::new(
            users,
            transport.clone(),
            MailSettings::default(),
            chrono_tz::Asia::Ho_Chi_Minh,
        );
        (sender, transport, user.id)
    }

    #[tokio::test]
    async fn renders_and_delivers_reminder_email() {
        let (sender, transport, user_id) = sender_with_user(Some("linh@example.com")).await;

        sender.send(user_id, &reminder(user_id)).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "linh@example.com");
        assert_eq!(sent[0].subject, "🔔 Reminder: Pay rent");
        assert!(sent[0].body.contains("Hello linh!"));
        assert!(sent[0].body.contains("Date: 1/3/2025"));
        assert!(sent[0].body.contains("Time: 09:00"));
        assert!(sent[0].body.contains("Repeat: Every month"));
        assert!(sent[0].html.contains(">Pay rent</h3>"));
        assert!(sent[0].html.contains("<strong>📅 Date:</strong> 1/3/2025"));
    }

    #[test]
    fn html_body_escapes_user_text() {
        let user = User {
            id: 1,
            username: "<b>linh</b>".to_owned(),
            email: Some("linh@example.com".to_owned()),
        };
        let mut reminder = reminder(1);
        reminder.title = "Rent & \"utilities\"".to_owned();

        let email = ReminderEmail::render(
            &MailSettings::default(),
            &user,
            "linh@example.com",
            &reminder,
            chrono_tz::Asia::Ho_Chi_Minh,
        );

        assert!(email.html.contains("Hello &lt;b&gt;linh&lt;/b&gt;!"));
        assert!(email.html.contains("Rent &amp; &quot;utilities&quot;"));
        assert!(email.body.contains("Rent & \"utilities\""));
    }

    #[tokio::test]
    async fn user_without_email_is_a_failed_send() {
        let (sender, transport, user_id) = sender_with_user(None).await;

        let result = sender.send(user_id, &reminder(user_id)).await;

        assert!(matches!(result, Err(NotificationError::NoEmailConfigured(id)) if id == user_id));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_a_failed_send() {
        let (sender, _, user_id) = sender_with_user(Some("linh@example.com")).await;

        let result = sender.send(user_id + 100, &reminder(user_id + 100)).await;

        assert!(matches!(result, Err(NotificationError::UnknownUser(_))));
    }
}
