use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteSynchronous;
use tagsync_core::ConfigStore;
use tagsync_core::RequiredTagConfig;
use tagsync_core::Result;
use tagsync_core::RunStats;
use tagsync_core::StatsStore;
use tagsync_core::TagSyncErr;
use tagsync_core::TaskQueue;
use tagsync_core::TypeRegistryEntry;
use tagsync_core::TypeRegistryStore;
use tagsync_core::UpdateTask;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS audit_config (
        subscription_id TEXT PRIMARY KEY,
        required_tags TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS run_stats (
        id TEXT PRIMARY KEY,
        subscription_id TEXT NOT NULL,
        groups_total INTEGER NOT NULL,
        groups_skipped INTEGER NOT NULL,
        resources_total INTEGER NOT NULL,
        resources_skipped INTEGER NOT NULL,
        resources_updated INTEGER NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS resource_types (
        resource_type TEXT PRIMARY KEY,
        api_version TEXT NOT NULL,
        location TEXT NOT NULL,
        error_message TEXT
    )",
    "CREATE TABLE IF NOT EXISTS task_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        body TEXT NOT NULL,
        enqueued_at TEXT NOT NULL,
        claimed_at TEXT
    )",
];

/// A SQLite-backed store for every persisted surface of the pipeline:
/// configuration rows, run statistics, the resource-type registry, and the
/// update-task queue.
#[derive(Clone)]
pub struct StateDb {
    pool: sqlx::SqlitePool,
    path: PathBuf,
}

fn store_err(err: sqlx::Error) -> TagSyncErr {
    TagSyncErr::Store(err.to_string())
}

impl StateDb {
    /// Open the database at `path`, creating it and applying the schema if
    /// missing.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_err)?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(store_err)?;
        }
        info!(path = %path.display(), "opened state database");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// On-disk path of this database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the oldest unclaimed task, marking it so a concurrent drain does
    /// not pick it up again. Returns the row id alongside the task.
    pub async fn claim_next_task(&self) -> Result<Option<(i64, UpdateTask)>> {
        let row = sqlx::query(
            "UPDATE task_queue
             SET claimed_at = ?1
             WHERE id = (
                 SELECT id FROM task_queue
                 WHERE claimed_at IS NULL
                 ORDER BY id
                 LIMIT 1
             )
             RETURNING id, body",
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.try_get("id").map_err(store_err)?;
        let body: String = row.try_get("body").map_err(store_err)?;
        let task = serde_json::from_str(&body)
            .map_err(|err| TagSyncErr::Store(format!("malformed task body: {err}")))?;
        Ok(Some((id, task)))
    }

    /// Remove a completed task.
    pub async fn delete_task(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM task_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Upsert a configuration row, replacing any existing entry for the
    /// subscription.
    pub async fn set_config(&self, config: &RequiredTagConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_config (subscription_id, required_tags)
             VALUES (?1, ?2)
             ON CONFLICT(subscription_id) DO UPDATE SET required_tags = excluded.required_tags",
        )
        .bind(&config.subscription_id)
        .bind(&config.required_tags)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// Clear a type's quarantine flag, keeping its cached API version.
    /// Returns false when no entry for the type exists.
    pub async fn clear_quarantine(&self, resource_type: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE resource_types SET error_message = NULL WHERE resource_type = ?1",
        )
        .bind(resource_type)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ConfigStore for StateDb {
    async fn load_configs(&self) -> Result<Vec<RequiredTagConfig>> {
        let rows = sqlx::query("SELECT subscription_id, required_tags FROM audit_config")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.into_iter()
            .map(|row| {
                Ok(RequiredTagConfig {
                    subscription_id: row.try_get("subscription_id").map_err(store_err)?,
                    required_tags: row.try_get("required_tags").map_err(store_err)?,
                })
            })
            .collect()
    }

    async fn insert_config(&self, config: &RequiredTagConfig) -> Result<()> {
        self.set_config(config).await
    }
}

#[async_trait]
impl StatsStore for StateDb {
    async fn record_run(&self, stats: &RunStats) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_stats (
                id, subscription_id, groups_total, groups_skipped,
                resources_total, resources_skipped, resources_updated,
                started_at, finished_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(stats.id.to_string())
        .bind(&stats.subscription_id)
        .bind(stats.groups_total as i64)
        .bind(stats.groups_skipped as i64)
        .bind(stats.resources_total as i64)
        .bind(stats.resources_skipped as i64)
        .bind(stats.resources_updated as i64)
        .bind(stats.started_at.to_rfc3339())
        .bind(stats.finished_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl TypeRegistryStore for StateDb {
    async fn load_all(&self) -> Result<Vec<TypeRegistryEntry>> {
        let rows = sqlx::query(
            "SELECT resource_type, api_version, location, error_message FROM resource_types",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter()
            .map(|row| {
                Ok(TypeRegistryEntry {
                    resource_type: row.try_get("resource_type").map_err(store_err)?,
                    api_version: row.try_get("api_version").map_err(store_err)?,
                    location: row.try_get("location").map_err(store_err)?,
                    error_message: row.try_get("error_message").map_err(store_err)?,
                })
            })
            .collect()
    }

    async fn upsert(&self, entry: &TypeRegistryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO resource_types (resource_type, api_version, location, error_message)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(resource_type) DO UPDATE SET
                 api_version = excluded.api_version,
                 location = excluded.location,
                 error_message = excluded.error_message",
        )
        .bind(&entry.resource_type)
        .bind(&entry.api_version)
        .bind(&entry.location)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for StateDb {
    async fn enqueue(&self, task: &UpdateTask) -> Result<()> {
        let body = serde_json::to_string(task)
            .map_err(|err| TagSyncErr::Store(format!("serialize task: {err}")))?;
        sqlx::query("INSERT INTO task_queue (body, enqueued_at) VALUES (?1, ?2)")
            .bind(body)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
