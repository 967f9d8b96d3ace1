#![cfg(feature = "database")]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::store::{compute_summary, StoreError, TransientStore};
use crate::workflow::types::{
    AlertWorkflowLocation, AuditLogEntry, ChangeSet, ClassificationRecord, MarshallWorkflowLocation,
    TransientId, TransientRecord, TransientSummary,
};

const SELECT_TRANSIENT: &str = r#"
    SELECT id, name, ra, dec, marshall_workflow_location, alert_workflow_location,
           snoozed, classified_flag, pi_name, pi_email, observation_priority,
           last_reviewed_mag_date, revision
    FROM transients
    WHERE id = ?1
"#;

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed transient store. Every change set is committed inside one
/// transaction, guarded by the record's revision column.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Initialize database with automatic migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        // Create database if it doesn't exist
        if !config.url.contains(":memory:") && !Sqlite::database_exists(&config.url).await? {
            info!("Creating database at {}", config.url);
            Sqlite::create_database(&config.url).await?;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        if config.auto_migrate {
            store.migrate().await?;
        }
        Ok(store)
    }

    /// Private in-memory database on a single connection, migrated
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TransientRecord, StoreError> {
    let mwl: String = row.try_get("marshall_workflow_location")?;
    let awl: Option<String> = row.try_get("alert_workflow_location")?;
    let revision: i64 = row.try_get("revision")?;

    Ok(TransientRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        ra: row.try_get("ra")?,
        dec: row.try_get("dec")?,
        mwl: MarshallWorkflowLocation::parse(&mwl)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown marshallWorkflowLocation `{mwl}`")))?,
        awl: awl.as_deref().map(AlertWorkflowLocation::from_stored),
        snoozed: row.try_get("snoozed")?,
        classified: row.try_get("classified_flag")?,
        pi_name: row.try_get("pi_name")?,
        pi_email: row.try_get("pi_email")?,
        observation_priority: row.try_get("observation_priority")?,
        last_reviewed_mag_date: row.try_get("last_reviewed_mag_date")?,
        revision: u64::try_from(revision)
            .map_err(|_| StoreError::Corrupt(format!("negative revision {revision}")))?,
    })
}

async fn fetch_record(
    conn: &mut SqliteConnection,
    transient_id: TransientId,
) -> Result<Option<TransientRecord>, StoreError> {
    sqlx::query(SELECT_TRANSIENT)
        .bind(transient_id)
        .fetch_optional(conn)
        .await?
        .as_ref()
        .map(record_from_row)
        .transpose()
}

async fn fetch_classification(
    conn: &mut SqliteConnection,
    transient_id: TransientId,
) -> Result<Option<ClassificationRecord>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT transient_id, name, ra, dec, observation_date, observation_mjd, survey,
               classification, redshift, classification_wrt_max, phase, reducer
        FROM transient_classifications
        WHERE transient_id = ?1
        "#,
    )
    .bind(transient_id)
    .fetch_optional(conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let observation_date: NaiveDate = row.try_get("observation_date")?;
    Ok(Some(ClassificationRecord {
        transient_id: row.try_get("transient_id")?,
        name: row.try_get("name")?,
        ra: row.try_get("ra")?,
        dec: row.try_get("dec")?,
        observation_date,
        observation_mjd: row.try_get("observation_mjd")?,
        survey: row.try_get("survey")?,
        classification: row.try_get("classification")?,
        redshift: row.try_get("redshift")?,
        classification_wrt_max: row.try_get("classification_wrt_max")?,
        phase: row.try_get("phase")?,
        reducer: row.try_get("reducer")?,
    }))
}

/// Apply one change set on a connection that already holds the write lock
async fn apply_change_set(
    conn: &mut SqliteConnection,
    transient_id: TransientId,
    changes: ChangeSet,
) -> Result<TransientRecord, StoreError> {
    let mut record = fetch_record(&mut *conn, transient_id)
        .await?
        .ok_or(StoreError::Missing { transient_id })?;
    if record.revision != changes.expected_revision {
        return Err(StoreError::Conflict { transient_id });
    }
    record.apply(&changes.update);
    record.revision += 1;

    let updated = sqlx::query(
        r#"
        UPDATE transients
        SET marshall_workflow_location = ?1,
            alert_workflow_location = ?2,
            snoozed = ?3,
            classified_flag = ?4,
            pi_name = ?5,
            pi_email = ?6,
            observation_priority = ?7,
            last_reviewed_mag_date = ?8,
            revision = ?9
        WHERE id = ?10 AND revision = ?11
        "#,
    )
    .bind(record.mwl.as_str())
    .bind(record.awl.as_ref().map(|a| a.as_str().to_string()))
    .bind(record.snoozed)
    .bind(record.classified)
    .bind(&record.pi_name)
    .bind(&record.pi_email)
    .bind(record.observation_priority)
    .bind(record.last_reviewed_mag_date)
    .bind(record.revision as i64)
    .bind(transient_id)
    .bind(changes.expected_revision as i64)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() != 1 {
        return Err(StoreError::Conflict { transient_id });
    }

    for entry in &changes.audit {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transients_history_logs (transient_id, date_created, log, dedup_key)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(entry.transient_id)
        .bind(entry.date_created)
        .bind(&entry.message)
        .bind(&entry.dedup_key)
        .execute(&mut *conn)
        .await?;
        if inserted.rows_affected() == 0 {
            debug!(transient_id, dedup_key = %entry.dedup_key, "Skipping duplicate history entry");
        }
    }

    if let Some(classification) = &changes.classification {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO transient_classifications (
                transient_id, name, ra, dec, observation_date, observation_mjd, survey,
                classification, redshift, classification_wrt_max, phase, reducer
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(classification.transient_id)
        .bind(&classification.name)
        .bind(classification.ra)
        .bind(classification.dec)
        .bind(classification.observation_date)
        .bind(classification.observation_mjd)
        .bind(&classification.survey)
        .bind(&classification.classification)
        .bind(classification.redshift)
        .bind(&classification.classification_wrt_max)
        .bind(&classification.phase)
        .bind(&classification.reducer)
        .execute(&mut *conn)
        .await?;
    }

    if changes.recompute_summary {
        let history_entries: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transients_history_logs WHERE transient_id = ?1",
        )
        .bind(transient_id)
        .fetch_one(&mut *conn)
        .await?;
        let classification = fetch_classification(&mut *conn, transient_id).await?;
        let summary = compute_summary(
            &record,
            classification.as_ref(),
            history_entries.max(0) as u64,
            Utc::now(),
        );

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO transient_summaries (
                transient_id, marshall_workflow_location, current_classification,
                classification_mjd, history_entries, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(summary.transient_id)
        .bind(summary.mwl.as_str())
        .bind(&summary.current_classification)
        .bind(summary.classification_mjd)
        .bind(summary.history_entries as i64)
        .bind(summary.updated_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(record)
}

#[async_trait]
impl TransientStore for SqliteStore {
    async fn insert(&self, record: TransientRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transients (
                id, name, ra, dec, marshall_workflow_location, alert_workflow_location,
                snoozed, classified_flag, pi_name, pi_email, observation_priority,
                last_reviewed_mag_date, revision
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(record.ra)
        .bind(record.dec)
        .bind(record.mwl.as_str())
        .bind(record.awl.as_ref().map(|a| a.as_str().to_string()))
        .bind(record.snoozed)
        .bind(record.classified)
        .bind(&record.pi_name)
        .bind(&record.pi_email)
        .bind(record.observation_priority)
        .bind(record.last_reviewed_mag_date)
        .bind(record.revision as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                transient_id: record.id,
            });
        }
        Ok(())
    }

    async fn fetch(&self, transient_id: TransientId) -> Result<Option<TransientRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, transient_id).await
    }

    async fn commit(
        &self,
        transient_id: TransientId,
        changes: ChangeSet,
    ) -> Result<TransientRecord, StoreError> {
        let mut conn = self.pool.acquire().await?;
        // take the write lock up front; a deferred BEGIN would fail with
        // SQLITE_BUSY when upgrading from the read below
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = match apply_change_set(&mut conn, transient_id, changes).await {
            Ok(record) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| record)
                .map_err(StoreError::from),
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            let rollback = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            if let Err(rollback) = rollback {
                warn!(transient_id, error = %rollback, "Rollback failed, closing connection");
                let _ = conn.close().await;
            }
        }
        outcome
    }

    async fn history(&self, transient_id: TransientId) -> Result<Vec<AuditLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT transient_id, date_created, log, dedup_key
            FROM transients_history_logs
            WHERE transient_id = ?1
            ORDER BY date_created ASC, id ASC
            "#,
        )
        .bind(transient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AuditLogEntry, StoreError> {
                Ok(AuditLogEntry {
                    transient_id: row.try_get("transient_id")?,
                    date_created: row.try_get::<DateTime<Utc>, _>("date_created")?,
                    message: row.try_get("log")?,
                    dedup_key: row.try_get("dedup_key")?,
                })
            })
            .collect()
    }

    async fn classification(
        &self,
        transient_id: TransientId,
    ) -> Result<Option<ClassificationRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_classification(&mut conn, transient_id).await
    }

    async fn summary(&self, transient_id: TransientId) -> Result<Option<TransientSummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT transient_id, marshall_workflow_location, current_classification,
                   classification_mjd, history_entries, updated_at
            FROM transient_summaries
            WHERE transient_id = ?1
            "#,
        )
        .bind(transient_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mwl: String = row.try_get("marshall_workflow_location")?;
        let history_entries: i64 = row.try_get("history_entries")?;
        Ok(Some(TransientSummary {
            transient_id: row.try_get("transient_id")?,
            mwl: MarshallWorkflowLocation::parse(&mwl)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown marshallWorkflowLocation `{mwl}`")))?,
            current_classification: row.try_get("current_classification")?,
            classification_mjd: row.try_get("classification_mjd")?,
            history_entries: history_entries.max(0) as u64,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}
