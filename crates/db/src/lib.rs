use std::time::Duration;

use sea_orm::{
    ConnectOptions, Database, DatabaseTransaction, SqliteTransactionMode, TransactionOptions,
    sqlx::sqlite::{SqliteJournalMode, SqliteSynchronous},
};
use sea_orm_migration::MigratorTrait;

pub mod entities;
pub mod events;
pub mod models;
mod retry;
pub mod types;

pub use retry::retry_on_sqlite_busy;
pub use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, TransactionTrait};

pub type DbPool = DatabaseConnection;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

impl DBService {
    /// Connects to `database_url` and brings the schema up to date.
    pub async fn new(database_url: &str) -> Result<DBService, DbErr> {
        let in_memory = database_url.starts_with("sqlite::memory:");
        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .max_connections(if in_memory { 1 } else { 10 })
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false)
            .map_sqlx_sqlite_opts(move |opts| {
                let opts = opts.busy_timeout(SQLITE_BUSY_TIMEOUT);
                if in_memory {
                    opts
                } else {
                    opts.journal_mode(SqliteJournalMode::Wal)
                        .synchronous(SqliteSynchronous::Normal)
                }
            });

        let pool = Database::connect(options).await?;
        db_migration::Migrator::up(&pool, None).await?;
        tracing::debug!("database migrations applied");
        Ok(DBService { pool })
    }

    pub fn from_connection(pool: DbPool) -> DBService {
        DBService { pool }
    }
}

/// Starts a transaction holding the SQLite write lock from `BEGIN IMMEDIATE`.
/// A deferred transaction that reads before writing fails with `SQLITE_BUSY`
/// when another writer got in first; this one waits out the busy timeout
/// instead. Other backends ignore the mode.
pub async fn begin_write(pool: &DbPool) -> Result<DatabaseTransaction, DbErr> {
    pool.begin_with_options(TransactionOptions {
        sqlite_transaction_mode: Some(SqliteTransactionMode::Immediate),
        ..Default::default()
    })
    .await
}
