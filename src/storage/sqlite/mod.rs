pub mod reminder_storage;
pub mod user_storage;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub use reminder_storage::SqliteReminderStorage;
pub use user_storage::SqliteUserStorage;

/// Opens the pool and brings the schema up to date.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    // every connection to `:memory:` is a separate database, so keep exactly one alive
    let pool_options = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
    };

    let pool = pool_options.connect_with(options).await?;
    sqlx::migrate!().run(&pool).await?;

    log::info!("Connected to database {}", url);
    Ok(pool)
}
