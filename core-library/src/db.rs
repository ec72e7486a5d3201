//! # Database Connection Pool Module
//!
//! Provides SQLite connection pooling and the single-writer gate for the
//! content cache.
//!
//! ## Features
//!
//! - **WAL Mode**: Enabled for file databases (multiple readers, one writer)
//! - **Connection Pooling**: Configurable min/max connections with timeouts
//! - **Foreign Keys**: Enforced so child rows cascade with their item
//! - **Automatic Migrations**: Runs on initialization
//! - **Write Gate**: Every mutating transaction is serialized and publishes
//!   change notifications only after it commits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{DatabaseConfig, LibraryDatabase};
//!
//! let db = LibraryDatabase::open(DatabaseConfig::new("nightlight.db")).await?;
//!
//! let mut tx = db.begin_write().await?;
//! sqlx::query("UPDATE content_items SET is_favourite = 1 WHERE document_id = ?")
//!     .bind("doc-1")
//!     .execute(tx.conn())
//!     .await?;
//! tx.mark_changed(ContentKind::Track);
//! tx.commit().await?;
//! ```
//!
//! ## Testing
//!
//! For tests, use in-memory databases:
//!
//! ```rust,ignore
//! let db = LibraryDatabase::open_in_memory().await?;
//! ```

use crate::changes::ChangeNotifier;
use crate::models::ContentKind;
use crate::{LibraryError, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Pool, Sqlite, Transaction};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Database configuration for SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (`sqlite:<path>` or `sqlite::memory:`)
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,

    /// Maximum idle time for a connection before being closed
    pub idle_timeout: Option<Duration>,

    /// Enable statement caching (number of statements to cache)
    pub statement_cache_capacity: usize,

    /// Capacity of the change notification channel
    pub change_buffer_size: usize,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let database_url = format!("sqlite:{}", path.display());

        Self {
            database_url,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            idle_timeout: Some(Duration::from_secs(600)),  // 10 minutes
            statement_cache_capacity: 100,
            change_buffer_size: 64,
        }
    }

    /// Create a configuration for an in-memory database.
    ///
    /// The database lives exactly as long as its single connection, so the
    /// pool never grows, never idles out and never recycles it.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
            statement_cache_capacity: 100,
            change_buffer_size: 64,
        }
    }

    /// Build from a path, treating `:memory:` as the in-memory database
    pub fn from_path(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        if path.as_os_str() == ":memory:" {
            Self::in_memory()
        } else {
            Self::new(path)
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }

    /// Set the minimum number of connections
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquire timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the statement cache capacity
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Set the change notification buffer
    pub fn change_buffer_size(mut self, size: usize) -> Self {
        self.change_buffer_size = size;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool
///
/// This function:
/// 1. Configures SQLite connection options (WAL mode, foreign keys, etc.)
/// 2. Creates a connection pool with the specified configuration
/// 3. Runs database migrations
/// 4. Performs a health check
///
/// # Errors
///
/// Returns an error if the database cannot be opened, the pool cannot be
/// created, migrations fail or the health check fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let mut connect_options =
        SqliteConnectOptions::from_str(&config.database_url).map_err(LibraryError::Database)?;

    connect_options = connect_options
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .pragma("cache_size", "-16000")
        .statement_cache_capacity(config.statement_cache_capacity);

    if !config.is_in_memory() {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
    }

    debug!("SQLite connection options configured");

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            LibraryError::Database(e)
        })?;

    info!(
        connections = pool.size(),
        "Database connection pool created successfully"
    );

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// Create a migrated in-memory pool for tests
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Apply all pending migrations embedded from `migrations/`
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            LibraryError::Migration(e.to_string())
        })?;

    info!("Database migrations completed successfully");
    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Performing database health check");

    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        LibraryError::Database(e)
    })?;

    debug!("Database health check passed");
    Ok(())
}

// =============================================================================
// Library Database
// =============================================================================

/// Shared handle to the content cache.
///
/// Cloning is cheap; all clones share the pool, the write gate and the
/// change notifier.
#[derive(Debug, Clone)]
pub struct LibraryDatabase {
    pool: Pool<Sqlite>,
    write_gate: Arc<Mutex<()>>,
    changes: ChangeNotifier,
}

impl LibraryDatabase {
    /// Open (and migrate) the database described by `config`
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let changes = ChangeNotifier::new(config.change_buffer_size);
        let pool = create_pool(config).await?;
        Ok(Self::with_notifier(pool, changes))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory()).await
    }

    /// Wrap an already migrated pool
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self::with_notifier(pool, ChangeNotifier::default())
    }

    fn with_notifier(pool: Pool<Sqlite>, changes: ChangeNotifier) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
            changes,
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn changes(&self) -> &ChangeNotifier {
        &self.changes
    }

    /// Wait for the write gate, then open a transaction.
    ///
    /// Do not acquire other pool connections while the returned transaction
    /// is alive; in-memory databases have exactly one.
    pub async fn begin_write(&self) -> Result<WriteTransaction> {
        let guard = Arc::clone(&self.write_gate).lock_owned().await;
        let tx = self.pool.begin().await?;

        Ok(WriteTransaction {
            tx,
            _guard: guard,
            touched: BTreeSet::new(),
            changes: self.changes.clone(),
        })
    }

    /// End every observer, then close the pool
    pub async fn close(&self) {
        self.changes.close();
        if !self.pool.is_closed() {
            info!("Closing database connection pool");
            self.pool.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// A serialized write transaction.
///
/// Dropping it without [`WriteTransaction::commit`] rolls back and publishes
/// nothing.
pub struct WriteTransaction {
    // Field order matters: the transaction must finish before the gate opens.
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
    touched: BTreeSet<ContentKind>,
    changes: ChangeNotifier,
}

impl WriteTransaction {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Record that rows of `kind` were modified
    pub fn mark_changed(&mut self, kind: ContentKind) {
        self.touched.insert(kind);
    }

    /// Commit, then publish one change per touched kind
    pub async fn commit(self) -> Result<()> {
        let WriteTransaction {
            tx,
            _guard,
            touched,
            changes,
        } = self;

        tx.commit().await?;

        for kind in touched {
            changes.notify(kind);
        }

        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
