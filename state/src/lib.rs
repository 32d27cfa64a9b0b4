//! SQLite-backed persistence for the tag audit pipeline.
//!
//! One database file holds all four persisted surfaces: configuration rows,
//! run statistics, the resource-type registry, and the update-task queue.
//! [`StateDb`] implements the corresponding `tagsync-core` store traits.

mod db;

pub use db::StateDb;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tagsync_core::ConfigStore;
    use tagsync_core::RequiredTagConfig;
    use tagsync_core::RunStats;
    use tagsync_core::StatsStore;
    use tagsync_core::TaskQueue;
    use tagsync_core::TypeRegistryEntry;
    use tagsync_core::TypeRegistryStore;
    use tagsync_core::UpdateTask;

    async fn open_temp() -> (tempfile::TempDir, StateDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = StateDb::open(&dir.path().join("tagsync.sqlite"))
            .await
            .expect("open db");
        (dir, db)
    }

    fn task(id: &str) -> UpdateTask {
        UpdateTask {
            id: id.to_string(),
            resource_type: "Microsoft.Foo/bars".to_string(),
            location: "westus".to_string(),
            subscription: "sub-1".to_string(),
            tags: [("env", "prod")].into_iter().collect(),
            api_version: "2021-01-01".to_string(),
        }
    }

    #[tokio::test]
    async fn config_rows_round_trip_and_upsert() {
        let (_dir, db) = open_temp().await;
        assert!(db.load_configs().await.unwrap().is_empty());

        let config = RequiredTagConfig {
            subscription_id: "sub-1".to_string(),
            required_tags: "env,owner".to_string(),
        };
        db.insert_config(&config).await.unwrap();
        db.set_config(&RequiredTagConfig {
            subscription_id: "sub-1".to_string(),
            required_tags: "env".to_string(),
        })
        .await
        .unwrap();

        let configs = db.load_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].required_tags, "env");
    }

    #[tokio::test]
    async fn registry_upsert_is_last_writer_wins() {
        let (_dir, db) = open_temp().await;
        let mut entry = TypeRegistryEntry {
            resource_type: "Microsoft.Foo/bars".to_string(),
            api_version: "2021-01-01".to_string(),
            location: "westus".to_string(),
            error_message: None,
        };
        db.upsert(&entry).await.unwrap();
        entry.error_message = Some("boom".to_string());
        db.upsert(&entry).await.unwrap();

        let rows = db.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_quarantined());
    }

    #[tokio::test]
    async fn clear_quarantine_keeps_cached_version() {
        let (_dir, db) = open_temp().await;
        db.upsert(&TypeRegistryEntry {
            resource_type: "Microsoft.Foo/bars".to_string(),
            api_version: "2021-01-01".to_string(),
            location: "westus".to_string(),
            error_message: Some("boom".to_string()),
        })
        .await
        .unwrap();

        assert!(db.clear_quarantine("Microsoft.Foo/bars").await.unwrap());
        assert!(!db.clear_quarantine("Microsoft.Missing/none").await.unwrap());

        let rows = db.load_all().await.unwrap();
        assert!(!rows[0].is_quarantined());
        assert_eq!(rows[0].api_version, "2021-01-01");
    }

    #[tokio::test]
    async fn queue_claims_in_fifo_order() {
        let (_dir, db) = open_temp().await;
        db.enqueue(&task("/r/first")).await.unwrap();
        db.enqueue(&task("/r/second")).await.unwrap();

        let (first_id, first) = db.claim_next_task().await.unwrap().expect("first claim");
        assert_eq!(first.id, "/r/first");
        let (_, second) = db.claim_next_task().await.unwrap().expect("second claim");
        assert_eq!(second.id, "/r/second");
        // Claimed rows are not handed out twice.
        assert!(db.claim_next_task().await.unwrap().is_none());

        db.delete_task(first_id).await.unwrap();
    }

    #[tokio::test]
    async fn run_stats_insert_succeeds() {
        let (_dir, db) = open_temp().await;
        let mut stats = RunStats::start("sub-1");
        stats.groups_total = 3;
        stats.finished_at = Some(chrono::Utc::now());
        db.record_run(&stats).await.unwrap();
    }
}
