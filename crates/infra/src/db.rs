use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

pub type Db = sqlx::SqlitePool;

/// Open the database and bring the schema up to date.
///
/// The pool is capped at a single connection on purpose: SQLite allows only
/// one writer at a time anyway, and funneling every unit of work through one
/// connection makes concurrent engine calls strictly serializable instead of
/// failing with SQLITE_BUSY. It also keeps a `sqlite::memory:` database alive
/// for the lifetime of the pool.
pub async fn connect(url: &str, busy_timeout: Duration) -> sqlx::Result<Db> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!(url, "database connected and migrated");

    Ok(pool)
}
