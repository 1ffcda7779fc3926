use std::sync::Arc;

use anyhow::Context;
use expensemind_reminders::{
    appsettings::AppSettings,
    clock::SystemClock,
    notification::{
        LogMailTransport, MailNotificationSender, NotificationSender, SmtpMailTransport,
    },
    scheduling::SchedulerService,
    storage::{
        InMemoryReminderStorage, InMemoryUserStorage, ReminderStorage, UserStorage,
        sqlite::{self, SqliteReminderStorage, SqliteUserStorage},
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::load().context("Could not load appsettings")?;
    let config = settings.scheduler.to_config()?;
    let tz = config.tz;

    let (reminders, users): (Arc<dyn ReminderStorage>, Arc<dyn UserStorage>) =
        match settings.database.url.as_deref() {
            Some(url) => {
                let pool = sqlite::connect(url).await?;
                let reminders: Arc<dyn ReminderStorage> =
                    Arc::new(SqliteReminderStorage::new(pool.clone(), tz));
                let users: Arc<dyn UserStorage> = Arc::new(SqliteUserStorage::new(pool));
                (reminders, users)
            }
            None => {
                log::warn!("No database configured, reminders will not survive a restart");
                let reminders: Arc<dyn ReminderStorage> =
                    Arc::new(InMemoryReminderStorage::new(tz));
                let users: Arc<dyn UserStorage> = Arc::new(InMemoryUserStorage::new());
                (reminders, users)
            }
        };

    let smtp = SmtpMailTransport::from_settings(&settings.mail)?;
    let sender: Arc<dyn NotificationSender> = match smtp {
        Some(smtp) => Arc::new(MailNotificationSender::new(users, smtp, settings.mail, tz)),
        None => {
            log::warn!("No SMTP host configured, reminder emails are only logged");
            Arc::new(MailNotificationSender::new(users, LogMailTransport, settings.mail, tz))
        }
    };
    let scheduler = SchedulerService::start(
        reminders,
        sender,
        Arc::new(SystemClock),
        config,
    )
    .await;

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    scheduler.shutdown().await;

    Ok(())
}
