use std::time::Duration;

use async_trait::async_trait;
use harvester_common::{HarvesterError, Result, Snapshot};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, info};

use crate::traits::Backend;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLSTATE class 08: connection exception.
const CONNECTION_EXCEPTION_CLASS: &str = "08";

const CREATE_GAUGES: &str = "CREATE TABLE IF NOT EXISTS gauges (
    id varchar(1024) PRIMARY KEY,
    value double precision
)";
const CREATE_COUNTERS: &str = "CREATE TABLE IF NOT EXISTS counters (
    id varchar(1024) PRIMARY KEY,
    value bigint
)";
const UPSERT_GAUGE: &str =
    "INSERT INTO gauges (id, value) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value";
const UPSERT_COUNTER: &str =
    "INSERT INTO counters (id, value) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value";
const SELECT_GAUGES: &str = "SELECT id, value FROM gauges";
const SELECT_COUNTERS: &str = "SELECT id, value FROM counters";

/// PostgreSQL persistence: one table per metric kind, flushed by transactional upsert.
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Connects and creates the schema if it does not exist yet.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await
            .map_err(db_error)?;

        let backend = Self { pool };
        backend.init_schema().await?;
        info!("postgres backend ready");
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query(CREATE_GAUGES)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query(CREATE_COUNTERS)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)
    }
}

#[async_trait]
impl Backend for PgBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        // Dropping the transaction on any early return rolls the whole flush back.
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        for (id, value) in &snapshot.gauges {
            sqlx::query(UPSERT_GAUGE)
                .bind(id)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        for (id, value) in &snapshot.counters {
            sqlx::query(UPSERT_COUNTER)
                .bind(id)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        debug!(metrics = snapshot.len(), "snapshot upserted");
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        let gauges: Vec<(String, f64)> = sqlx::query_as(SELECT_GAUGES)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        let counters: Vec<(String, i64)> = sqlx::query_as(SELECT_COUNTERS)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Snapshot {
            gauges: gauges.into_iter().collect(),
            counters: counters.into_iter().collect(),
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    fn is_transient(&self, err: &HarvesterError) -> bool {
        matches!(err, HarvesterError::ConnectionException(_))
    }
}

fn db_error(err: sqlx::Error) -> HarvesterError {
    let transient = match &err {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| is_connection_exception_code(&code)),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        _ => false,
    };

    if transient {
        HarvesterError::ConnectionException(err.to_string())
    } else {
        HarvesterError::Database(err.to_string())
    }
}

fn is_connection_exception_code(code: &str) -> bool {
    code.starts_with(CONNECTION_EXCEPTION_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_exception_class_is_transient() {
        for code in ["08000", "08003", "08006", "08001", "08004", "08007", "08P01"] {
            assert!(is_connection_exception_code(code), "{code}");
        }
        for code in ["23505", "42P01", "57P01", "40001"] {
            assert!(!is_connection_exception_code(code), "{code}");
        }
    }

    #[test]
    fn driver_io_and_pool_timeout_map_to_connection_exception() {
        let io = sqlx::Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(matches!(db_error(io), HarvesterError::ConnectionException(_)));
        assert!(matches!(
            db_error(sqlx::Error::PoolTimedOut),
            HarvesterError::ConnectionException(_)
        ));
        assert!(matches!(
            db_error(sqlx::Error::RowNotFound),
            HarvesterError::Database(_)
        ));
    }

    // Needs a reachable database; skipped unless HARVESTER_TEST_DATABASE_DSN is set.
    #[tokio::test]
    async fn save_then_load_round_trips() {
        let Ok(dsn) = std::env::var("HARVESTER_TEST_DATABASE_DSN") else {
            return;
        };
        let backend = PgBackend::connect(&dsn).await.unwrap();

        let mut snapshot = backend.load().await.unwrap();
        snapshot.gauges.insert("RoundTripGauge".to_string(), 123.65);
        snapshot.counters.insert("RoundTripCounter".to_string(), 42);
        backend.save(&snapshot).await.unwrap();

        let loaded = backend.load().await.unwrap();
        assert_eq!(loaded.gauges.get("RoundTripGauge"), Some(&123.65));
        assert_eq!(loaded.counters.get("RoundTripCounter"), Some(&42));
        backend.ping().await.unwrap();
    }
}
