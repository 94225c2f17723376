//! PostgreSQL repository implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{StorageError, StorageResult};
use crate::model::Checklist;
use crate::traits::{ChecklistRepository, NoopWriteObserver, WriteObserver};

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Largest number of checklists one `add` can insert: each row binds three
/// parameters and Postgres accepts at most 65535 per statement.
pub const MAX_INSERT_ROWS: usize = u16::MAX as usize / 3;

/// PostgreSQL connection options.
#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub username: String,
    pub password: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Timeout for acquiring a pooled connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum time a single query may run before it fails with
    /// `StorageError::QueryTimeout`.
    pub query_timeout_secs: u64,
    /// Number of connection attempts made by
    /// [`PostgresChecklistRepository::connect_with_retry`]. Zero is treated as one.
    pub connection_tries: u32,
    /// Pause between connection attempts.
    pub reconnect_period: Duration,
}

impl PostgresConfig {
    /// Renders the connection URL, password included.
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.db_name
        )
    }
}

// Custom Debug implementation to hide credentials
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("connection_tries", &self.connection_tries)
            .field("reconnect_period", &self.reconnect_period)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            db_name: "checklists".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            connection_tries: 5,
            reconnect_period: Duration::from_secs(1),
        }
    }
}

/// Stores user ids in a BIGINT column. The cast is bit-preserving, so ids
/// above `i64::MAX` round-trip unchanged.
fn user_id_to_db(user_id: u64) -> i64 {
    user_id as i64
}

fn limit_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn row_to_checklist(row: &sqlx::postgres::PgRow) -> StorageResult<Checklist> {
    let data: String = row
        .try_get("data")
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to read checklist data column: {e}"),
        })?;
    Checklist::from_json(&data)
}

/// PostgreSQL implementation of [`ChecklistRepository`].
///
/// The observer is owned by value; use [`PostgresChecklistRepository::with_observer`]
/// to attach one after the pool is connected.
pub struct PostgresChecklistRepository<O: WriteObserver = NoopWriteObserver> {
    pool: PgPool,
    query_timeout: Duration,
    observer: O,
}

impl PostgresChecklistRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self::with_timeout(pool, Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }

    /// Creates a repository from an existing pool with a custom query timeout.
    pub fn with_timeout(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
            observer: NoopWriteObserver,
        }
    }

    /// Connects a new pool with the given configuration (single attempt).
    #[instrument(skip(config))]
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.connection_url())
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self::with_timeout(
            pool,
            Duration::from_secs(config.query_timeout_secs),
        ))
    }

    /// Connects with up to `config.connection_tries` attempts, sleeping
    /// `config.reconnect_period` between them. Returns the last error when
    /// every attempt fails.
    pub async fn connect_with_retry(config: &PostgresConfig) -> StorageResult<Self> {
        let tries = config.connection_tries.max(1);
        let mut attempt = 1;
        loop {
            match Self::from_config(config).await {
                Ok(repository) => {
                    info!(
                        host = %config.host,
                        port = config.port,
                        db_name = %config.db_name,
                        attempt,
                        "Connected to PostgreSQL"
                    );
                    return Ok(repository);
                }
                Err(err) if attempt < tries => {
                    warn!(
                        error = %err,
                        attempt,
                        tries_left = tries - attempt,
                        "Unable to connect to PostgreSQL, retrying"
                    );
                    tokio::time::sleep(config.reconnect_period).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<O: WriteObserver> PostgresChecklistRepository<O> {
    /// Replaces the write observer, keeping the pool.
    pub fn with_observer<N: WriteObserver>(self, observer: N) -> PostgresChecklistRepository<N> {
        PostgresChecklistRepository {
            pool: self.pool,
            query_timeout: self.query_timeout,
            observer,
        }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs `future` bounded by the query timeout and the caller's
    /// cancellation token, and records duration metrics.
    ///
    /// # Metrics
    /// - `ova_checklist_storage_query_duration_seconds` - Histogram of query durations
    /// - `ova_checklist_storage_query_timeout_total` - Counter of timeout events
    async fn execute_with_cancellation_and_metrics<T, F>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        future: F,
    ) -> StorageResult<T>
    where
        F: std::future::Future<Output = StorageResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled {
                operation: operation.to_string(),
            }),
            outcome = tokio::time::timeout(self.query_timeout, future) => match outcome {
                Ok(result) => result,
                Err(_elapsed) => Err(StorageError::QueryTimeout {
                    operation: operation.to_string(),
                    timeout: self.query_timeout,
                }),
            },
        };
        let duration = start.elapsed().as_secs_f64();

        let status = match &result {
            Ok(_) => "success",
            Err(StorageError::QueryTimeout { .. }) => "timeout",
            Err(StorageError::Cancelled { .. }) => "cancelled",
            Err(_) => "error",
        };

        metrics::histogram!(
            "ova_checklist_storage_query_duration_seconds",
            "operation" => operation.to_string(),
            "backend" => "postgres",
            "status" => status
        )
        .record(duration);

        if status == "timeout" {
            metrics::counter!(
                "ova_checklist_storage_query_timeout_total",
                "operation" => operation.to_string(),
                "backend" => "postgres"
            )
            .increment(1);
        }

        result
    }

    /// Creates the `checklists` table and its index if they do not exist.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        // `seq` orders rows inserted by the same statement, which share `created_at`.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checklists (
                seq BIGSERIAL NOT NULL,
                user_id BIGINT NOT NULL,
                checklist_id TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, checklist_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to create checklists table: {e}"),
        })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_checklists_user_created
            ON checklists (user_id, created_at, seq)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError {
            message: format!("Failed to create checklists index: {e}"),
        })?;

        debug!("Database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl<O: WriteObserver> ChecklistRepository for PostgresChecklistRepository<O> {
    #[instrument(skip(self, cancel, checklists), fields(count = checklists.len()))]
    async fn add(
        &self,
        cancel: &CancellationToken,
        checklists: &[Checklist],
    ) -> StorageResult<()> {
        if checklists.is_empty() {
            return Ok(());
        }

        let rows = checklists
            .iter()
            .map(|c| Ok((user_id_to_db(c.user_id), c.id.clone(), c.to_json()?)))
            .collect::<StorageResult<Vec<_>>>()?;

        let pool = &self.pool;
        self.execute_with_cancellation_and_metrics("add", cancel, async move {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO checklists (user_id, checklist_id, data) ");
            builder.push_values(rows, |mut row, (user_id, checklist_id, data)| {
                row.push_bind(user_id)
                    .push_bind(checklist_id)
                    .push_bind(data);
            });
            builder
                .build()
                .execute(pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to insert checklists: {e}"),
                })
        })
        .await?;

        self.observer.on_add_success(checklists).await;
        Ok(())
    }

    #[instrument(skip(self, cancel))]
    async fn list(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        limit: u64,
        offset: u64,
    ) -> StorageResult<Vec<Checklist>> {
        let rows = self
            .execute_with_cancellation_and_metrics("list", cancel, async {
                sqlx::query(
                    r#"
                    SELECT data
                    FROM checklists
                    WHERE user_id = $1
                    ORDER BY created_at, seq
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(user_id_to_db(user_id))
                .bind(limit_to_db(limit))
                .bind(limit_to_db(offset))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to list checklists: {e}"),
                })
            })
            .await?;

        rows.iter().map(row_to_checklist).collect()
    }

    #[instrument(skip(self, cancel))]
    async fn describe(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        checklist_id: &str,
    ) -> StorageResult<Checklist> {
        let row = self
            .execute_with_cancellation_and_metrics("describe", cancel, async {
                sqlx::query(
                    r#"
                    SELECT data
                    FROM checklists
                    WHERE user_id = $1 AND checklist_id = $2
                    LIMIT 1
                    "#,
                )
                .bind(user_id_to_db(user_id))
                .bind(checklist_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to describe checklist: {e}"),
                })
            })
            .await?;

        match row {
            Some(row) => row_to_checklist(&row),
            None => Err(StorageError::ChecklistNotFound {
                user_id,
                checklist_id: checklist_id.to_string(),
            }),
        }
    }

    #[instrument(skip(self, cancel))]
    async fn remove(
        &self,
        cancel: &CancellationToken,
        user_id: u64,
        checklist_id: &str,
    ) -> StorageResult<()> {
        let result = self
            .execute_with_cancellation_and_metrics("remove", cancel, async {
                sqlx::query("DELETE FROM checklists WHERE user_id = $1 AND checklist_id = $2")
                    .bind(user_id_to_db(user_id))
                    .bind(checklist_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::QueryError {
                        message: format!("Failed to remove checklist: {e}"),
                    })
            })
            .await?;

        debug!(rows_affected = result.rows_affected(), "Checklist removed");
        self.observer.on_remove_success(user_id, checklist_id).await;
        Ok(())
    }

    #[instrument(skip(self, cancel, checklist), fields(user_id = checklist.user_id, checklist_id = %checklist.id))]
    async fn update(
        &self,
        cancel: &CancellationToken,
        checklist: &Checklist,
    ) -> StorageResult<()> {
        let data = checklist.to_json()?;
        let result = self
            .execute_with_cancellation_and_metrics("update", cancel, async {
                sqlx::query(
                    "UPDATE checklists SET data = $3 WHERE user_id = $1 AND checklist_id = $2",
                )
                .bind(user_id_to_db(checklist.user_id))
                .bind(&checklist.id)
                .bind(&data)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to update checklist: {e}"),
                })
            })
            .await?;

        debug!(rows_affected = result.rows_affected(), "Checklist updated");
        self.observer.on_update_success(checklist).await;
        Ok(())
    }
}

impl<O: WriteObserver> std::fmt::Debug for PostgresChecklistRepository<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresChecklistRepository")
            .field("pool", &"PgPool")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
