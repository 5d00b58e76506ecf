use tracing::{info, warn};

use wx_common::{Cycle, ModelProfile};

use crate::client::ObjectStoreClient;
use crate::path::StoragePath;

/// Result of enforcing keep-latest-only retention on one prefix.
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    pub prefix: String,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    pub delete_failures: u32,
}

/// Enforces "keep only the current cycle" on a profile's raw, colored and
/// tiles prefixes. Both HRRR and GFS-Wave use this same stricter rule —
/// earlier drafts kept all directories matching the current cycle hour
/// across dates, which let stale same-hour-yesterday data survive.
pub struct RetentionEnforcer<'a> {
    client: &'a ObjectStoreClient,
}

impl<'a> RetentionEnforcer<'a> {
    pub fn new(client: &'a ObjectStoreClient) -> Self {
        Self { client }
    }

    /// Enforces retention on `raw` and `colored` unconditionally, and on
    /// `tiles` only when `include_tiles` is set — `--disable-tiles` leaves
    /// the tiles prefix untouched rather than pruned to an empty set.
    ///
    /// `raw` and `colored` are flat — `<prefix>/<timestamp_dir>/<file>` —
    /// so a prefix match against the current cycle's marker is enough.
    /// `tiles` is organized `<prefix>/<variable>/<timestamp_dir>/...` (the
    /// TileGeneration subprocess's `--organize` output groups by variable
    /// first), so it needs its own rule that keeps one timestamp directory
    /// per variable instead of one for the whole prefix.
    pub async fn enforce_all(
        &self,
        profile: &ModelProfile,
        current_cycle: &Cycle,
        include_tiles: bool,
    ) -> anyhow::Result<Vec<RetentionReport>> {
        let mut reports = vec![
            self.enforce_prefix(StoragePath::raw_prefix(profile), current_cycle).await?,
            self.enforce_prefix(StoragePath::colored_prefix(profile), current_cycle).await?,
        ];
        if include_tiles {
            reports.push(
                self.enforce_tiles_prefix(StoragePath::tiles_prefix(profile), current_cycle)
                    .await?,
            );
        }
        Ok(reports)
    }

    async fn enforce_prefix(
        &self,
        prefix: &str,
        current_cycle: &Cycle,
    ) -> anyhow::Result<RetentionReport> {
        let keys = self.client.list(prefix).await?;
        let current_marker = format!("{prefix}/{}", current_cycle.timestamp_dir());

        let mut report = RetentionReport {
            prefix: prefix.to_string(),
            ..Default::default()
        };

        for key in keys {
            if key.starts_with(&current_marker) {
                report.kept.push(key);
                continue;
            }
            match self.client.delete(&key).await {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    warn!(key = %key, error = %e, "retention delete failed, leaving object in place");
                    report.delete_failures += 1;
                }
            }
        }

        info!(
            prefix,
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            failures = report.delete_failures,
            "retention enforced"
        );
        Ok(report)
    }

    /// Keys here look like `<prefix>/<variable>/<timestamp_dir>/<fff>/<z>/
    /// <x>/<y>.png` — the variable segment comes before the timestamp
    /// segment, so the flat `enforce_prefix` marker match never fires (it
    /// would delete every current-cycle tile, keeping nothing). Instead,
    /// for each key, the timestamp segment is the second path component
    /// after the prefix; a key survives if that segment is the current
    /// cycle's, independent of which variable it belongs to.
    async fn enforce_tiles_prefix(
        &self,
        prefix: &str,
        current_cycle: &Cycle,
    ) -> anyhow::Result<RetentionReport> {
        let keys = self.client.list(prefix).await?;
        let current_dir = current_cycle.timestamp_dir();

        let mut report = RetentionReport {
            prefix: prefix.to_string(),
            ..Default::default()
        };

        for key in keys {
            let timestamp_segment = key
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
                .and_then(|rest| rest.split('/').nth(1));

            if timestamp_segment == Some(current_dir.as_str()) {
                report.kept.push(key);
                continue;
            }
            match self.client.delete(&key).await {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    warn!(key = %key, error = %e, "retention delete failed, leaving object in place");
                    report.delete_failures += 1;
                }
            }
        }

        info!(
            prefix,
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            failures = report.delete_failures,
            "retention enforced"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ObjectStoreConfig;
    use bytes::Bytes;
    use chrono::NaiveDate;

    fn seeded_client() -> ObjectStoreClient {
        ObjectStoreClient::new(&ObjectStoreConfig {
            endpoint: None,
            bucket: "test".to_string(),
            access_key_id: None,
            secret_access_key: None,
            region: "us-east-1".to_string(),
            allow_http: false,
        })
        .unwrap()
    }

    fn cycle(hour: u32) -> Cycle {
        Cycle::new(NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(), hour)
    }

    #[tokio::test]
    async fn keeps_only_current_cycle_directory() {
        // Exercise path/marker logic directly against an in-memory store
        // constructed the same way client.rs's own unit tests do, rather
        // than through the S3 builder (which requires network config).
        use object_store::memory::InMemory;
        use object_store::path::Path as ObjPath;
        use object_store::ObjectStore;
        use std::sync::Arc;

        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        store
            .put(&ObjPath::from("hrrr/raw/20260727T12z/a.grib2"), Bytes::new().into())
            .await
            .unwrap();
        store
            .put(&ObjPath::from("hrrr/raw/20260727T11z/a.grib2"), Bytes::new().into())
            .await
            .unwrap();
        store
            .put(&ObjPath::from("hrrr/raw/20260726T12z/a.grib2"), Bytes::new().into())
            .await
            .unwrap();

        let client = ObjectStoreClient::from_store_for_test(store, "test".to_string());
        let enforcer = RetentionEnforcer::new(&client);
        let report = enforcer
            .enforce_prefix("hrrr/raw", &cycle(12))
            .await
            .unwrap();

        assert_eq!(report.kept.len(), 1);
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.delete_failures, 0);
    }

    #[tokio::test]
    async fn tiles_retention_keeps_the_current_cycle_across_every_variable() {
        // Tiles are organized <prefix>/<variable>/<timestamp>/..., unlike
        // raw/colored where the timestamp sits directly under the prefix.
        // A flat marker match would find none of these keys and delete the
        // current cycle outright; this pins the variable-aware rule.
        use object_store::memory::InMemory;
        use object_store::path::Path as ObjPath;
        use object_store::ObjectStore;
        use std::sync::Arc;

        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        for (variable, timestamp) in [
            ("temp_2m", "20260727T12z"),
            ("temp_2m", "20260727T11z"),
            ("wind_10m", "20260727T12z"),
            ("wind_10m", "20260726T12z"),
        ] {
            store
                .put(
                    &ObjPath::from(format!("hrrr/tiles/{variable}/{timestamp}/0/0/0/0.png")),
                    Bytes::new().into(),
                )
                .await
                .unwrap();
        }

        let client = ObjectStoreClient::from_store_for_test(store, "test".to_string());
        let enforcer = RetentionEnforcer::new(&client);
        let report = enforcer
            .enforce_tiles_prefix("hrrr/tiles", &cycle(12))
            .await
            .unwrap();

        assert_eq!(report.kept.len(), 2);
        assert!(report.kept.iter().all(|k| k.contains("20260727T12z")));
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.delete_failures, 0);
    }

    #[test]
    fn seeded_client_builds_without_network() {
        // `ObjectStoreClient::new` must not reach out over the network just
        // to construct a configured S3 builder.
        let _ = seeded_client();
    }
}
