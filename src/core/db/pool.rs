//! Postgres pool and schema migrations
//!
//! The pool is built once at startup from [`DbConfig`] and shared by every
//! repository. Migrations under `./migrations` are embedded at compile time.

use std::fmt;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Pool settings
#[derive(Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free connection
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl DbConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

// The URL carries credentials
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("database_url", &"[redacted]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// Pool setup errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Open the pool, establishing `min_connections` eagerly
pub async fn connect(config: &DbConfig) -> Result<PgPool, DbError> {
    Ok(config.options().connect(&config.database_url).await?)
}

/// Build the pool without touching the server; connections open on first use
pub fn connect_lazy(config: &DbConfig) -> Result<PgPool, DbError> {
    Ok(config.options().connect_lazy(&config.database_url)?)
}

/// Open the pool and bring the schema up to date
pub async fn connect_and_migrate(config: &DbConfig) -> Result<PgPool, DbError> {
    let pool = connect(config).await?;
    MIGRATOR.run(&pool).await?;

    tracing::info!(
        max_connections = config.max_connections,
        "database ready, migrations applied"
    );
    Ok(pool)
}

/// Round-trip a trivial query
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
