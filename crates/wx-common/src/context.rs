use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cycle::Cycle;
use crate::model_profile::ModelProfile;

/// Run-time toggles, all settable from the CLI with an env-var twin.
/// See SPEC_FULL.md's CLI/env table for the full flag list.
#[derive(Debug, Clone)]
pub struct Flags {
    pub dry_run: bool,
    pub upload_enabled: bool,
    pub tiles_enabled: bool,
    /// 1 (lowest) .. 3 (highest); forwarded to subprocess steps that honor it.
    pub priority: u8,
    /// Zoom levels to generate tiles for, e.g. "0-8".
    pub zoom_range: String,
    pub tile_workers: usize,
    pub max_run_secs: Option<u64>,
    /// Raw forecast-hour spec string, forwarded verbatim to the download
    /// subprocess's `--fxx` flag (`ctx.forecast_hours` is the parsed form
    /// the rest of the engine uses for counting and naming).
    pub forecast_hour_spec: String,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            dry_run: false,
            upload_enabled: true,
            tiles_enabled: true,
            priority: 2,
            zoom_range: "0-8".to_string(),
            tile_workers: 4,
            max_run_secs: None,
            forecast_hour_spec: "0-18".to_string(),
        }
    }
}

/// Everything a single run needs, threaded through every pipeline stage.
/// Constructed once in the driver's setup phase and never mutated after.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub model_profile: ModelProfile,
    pub cycle: Cycle,
    pub forecast_hours: Vec<u32>,
    pub workspace_root: PathBuf,
    pub log_dir: PathBuf,
    pub bucket_override: Option<String>,
    pub flags: Flags,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn downloads_dir(&self) -> PathBuf {
        self.workspace_root.join("downloads")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.workspace_root.join("processed")
    }

    pub fn colored_dir(&self) -> PathBuf {
        self.workspace_root.join("colored")
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.workspace_root.join("tiles")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.workspace_root.join(".pipeline.lock")
    }

    pub fn bucket(&self) -> &str {
        self.bucket_override
            .as_deref()
            .unwrap_or(&self.model_profile.bucket)
    }

    pub fn scratch_dirs(&self) -> [PathBuf; 4] {
        [
            self.downloads_dir(),
            self.processed_dir(),
            self.colored_dir(),
            self.tiles_dir(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_profile::ModelProfile;
    use chrono::NaiveDate;

    fn ctx() -> RunContext {
        RunContext {
            run_id: Uuid::nil(),
            model_profile: ModelProfile::hrrr_default(),
            cycle: Cycle::new(NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(), 12),
            forecast_hours: vec![0, 1, 2],
            workspace_root: PathBuf::from("/tmp/wx-run"),
            log_dir: PathBuf::from("/tmp/wx-run/logs"),
            bucket_override: None,
            flags: Flags::default(),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn scratch_dirs_are_nested_under_workspace_root() {
        let ctx = ctx();
        for dir in ctx.scratch_dirs() {
            assert!(dir.starts_with(&ctx.workspace_root));
        }
    }

    #[test]
    fn bucket_override_takes_precedence() {
        let mut ctx = ctx();
        assert_eq!(ctx.bucket(), "weather-tiles");
        ctx.bucket_override = Some("custom-bucket".to_string());
        assert_eq!(ctx.bucket(), "custom-bucket");
    }
}
