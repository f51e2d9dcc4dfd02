//! Database pool construction and embedded migrations.

use anyhow::{Context, Result, anyhow};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

/// Applied to every pooled connection. The 30 s busy timeout absorbs
/// write contention between concurrent orchestrations; WAL lets readers
/// proceed while one of them writes. Foreign keys stay unenforced (the
/// bundled SQLite is compiled with them on by default): orphaned deals are
/// expected when pruning races the matcher, and are reconciled rather than
/// blocked at the storage layer.
#[derive(Debug)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 30000; \
             PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = OFF;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open the pool against the given SQLite path (or `:memory:`).
pub fn establish_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)
        .with_context(|| format!("failed to open database at {}", database_url))?;
    Ok(pool)
}

/// Run any pending embedded migrations. Idempotent; safe on every startup.
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("failed to run migrations: {e}"))?;
    if !applied.is_empty() {
        info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}
