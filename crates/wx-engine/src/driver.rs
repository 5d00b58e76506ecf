use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use wx_common::{Outcome, PipelineError, Result, RunContext, StepName, StepRecord};
use wx_metrics::{MetricSink, MetricsPublisher, RunOutcome};
use wx_step_runner::{StepRunner, WorkspaceGuard};
use wx_store::{Manifest, ManifestEmitter, ObjectStoreClient, RetentionEnforcer, StoragePath};

use crate::lock::LockGuard;
use crate::subprocess;

/// Every `StepRecord` the run produced, in stage order, plus the run's
/// terminal outcome.
pub struct RunReport {
    pub records: Vec<StepRecord>,
    pub outcome: RunOutcome,
}

/// Drives one model through `Init → Download → Processing → Colormap →
/// TileGeneration → Upload → Metadata → Retention → Flush → Exit`. Every
/// stage but Processing is strict — its first failure fail-stops the run.
/// Retention runs after Metadata and is best-effort: its failures are
/// counted but never change the run's exit status. Every exit path still
/// reaches workspace teardown and a metric flush.
pub struct PipelineDriver<P: MetricsPublisher> {
    ctx: RunContext,
    step_runner: StepRunner,
    metrics: MetricSink<P>,
    store: ObjectStoreClient,
}

impl<P: MetricsPublisher> PipelineDriver<P> {
    pub fn new(ctx: RunContext, metrics: MetricSink<P>, store: ObjectStoreClient) -> Self {
        let step_runner = StepRunner::new(ctx.flags.dry_run);
        Self {
            ctx,
            step_runner,
            metrics,
            store,
        }
    }

    /// Runs the full pipeline once. Acquires the single-instance lock
    /// first (an `AlreadyRunning` error here is the only path that skips
    /// teardown and metric flush, since nothing was set up yet) then
    /// guarantees workspace cleanup and a metric flush on every other
    /// path, including a `max_run_secs` timeout.
    pub async fn run(&self) -> Result<RunReport> {
        let _lock = LockGuard::acquire(&self.ctx.lock_path())?;
        let guard = WorkspaceGuard::create(self.ctx.workspace_root.clone())?;

        let staged = match self.ctx.flags.max_run_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), self.run_stages(&guard)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::StageFailed {
                    stage: "run".to_string(),
                    message: format!("exceeded max-run-secs={secs}"),
                }),
            },
            None => self.run_stages(&guard).await,
        };

        let data_age = (Utc::now() - self.ctx.cycle.as_datetime()).num_seconds().max(0) as f64;
        self.metrics.record_data_age_seconds(data_age).await;

        let processing_time = (Utc::now() - self.ctx.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.metrics.record_processing_time_seconds(processing_time).await;

        let outcome = if staged.is_ok() {
            RunOutcome::Success
        } else {
            RunOutcome::Failure
        };
        self.metrics.finish(outcome).await;
        self.metrics.flush().await;

        if guard.escalation_count() > 0 {
            warn!(
                count = guard.escalation_count(),
                "scratch cleanup required privilege escalation"
            );
        }

        staged
    }

    async fn run_stages(&self, guard: &WorkspaceGuard) -> Result<RunReport> {
        let mut records = Vec::new();

        let (record, downloaded) = self.stage_download(guard).await?;
        records.push(record);

        let (record, processed) = self.stage_processing(guard, &downloaded).await?;
        records.push(record);

        let (record, colored) = self.stage_colormap(guard, &processed).await?;
        records.push(record);

        let (record, tile_dirs) = self.stage_tile_generation(guard).await?;
        records.push(record);

        let record = self.stage_upload(&colored, &tile_dirs).await?;
        records.push(record);

        let record = self.stage_metadata(guard).await?;
        records.push(record);

        self.run_retention().await;

        Ok(RunReport {
            records,
            outcome: RunOutcome::Success,
        })
    }

    /// Download is one subprocess invocation per cycle, covering every
    /// requested forecast hour in a single call (the "Processing" stage
    /// below is the only one invoked per-file).
    async fn stage_download(&self, guard: &WorkspaceGuard) -> Result<(StepRecord, Vec<PathBuf>)> {
        let start = Utc::now();
        let downloads_dir = guard.root().join("downloads");

        let expected: Vec<PathBuf> = self
            .ctx
            .forecast_hours
            .iter()
            .map(|fh| {
                downloads_dir.join(format!(
                    "{}.{}.t{:02}z.f{:03}.grib2",
                    self.ctx.model_profile.name,
                    self.ctx.cycle.date_compact(),
                    self.ctx.cycle.hour,
                    fh
                ))
            })
            .collect();
        let dry_run_outputs: Vec<&Path> = expected.iter().map(PathBuf::as_path).collect();

        let cmd = subprocess::download(
            &self.ctx.cycle.date_dashed(),
            self.ctx.cycle.hour,
            &self.ctx.flags.forecast_hour_spec,
            &downloads_dir,
        );
        self.step_runner
            .run("download", &cmd, &dry_run_outputs)
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: "download".to_string(),
                message: e.to_string(),
            })?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&downloads_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(PipelineError::StageFailed {
                stage: "download".to_string(),
                message: "download produced zero files".to_string(),
            });
        }

        self.metrics.record_files_downloaded(files.len() as u64).await;
        let end = Utc::now();
        let record = StepRecord {
            name: StepName::Download,
            start_ts: start,
            end_ts: end,
            outcome: Outcome::Ok,
            artifact_count: files.len() as u64,
            error_message: None,
        };
        self.metrics.record_step(&record).await;
        Ok((record, files))
    }

    /// The only tolerant stage: a per-file failure is logged and skipped
    /// rather than fail-stopping the run. The stage as a whole only fails
    /// if every input failed to process.
    async fn stage_processing(
        &self,
        guard: &WorkspaceGuard,
        inputs: &[PathBuf],
    ) -> Result<(StepRecord, Vec<PathBuf>)> {
        let start = Utc::now();
        let variable = self.primary_variable();
        let mut outputs = Vec::new();
        let mut last_error: Option<String> = None;

        let processed_dir = guard.root().join("processed");
        for input in inputs {
            let stem = file_stem(input);
            let output = processed_dir.join(format!("{variable}_{stem}.tif"));
            let cmd = subprocess::grib2_to_cog(input, &processed_dir, &self.ctx.model_profile.config_path, self.ctx.flags.priority);
            match self.step_runner.run("processing", &cmd, &[output.as_path()]).await {
                Ok(_) => outputs.push(output),
                Err(e) => {
                    warn!(input = %input.display(), error = %e, "processing failed for one file, continuing");
                    last_error = Some(e.to_string());
                }
            }
        }

        self.metrics.record_files_processed(outputs.len() as u64).await;
        let end = Utc::now();
        let outcome = if outputs.is_empty() { Outcome::Failed } else { Outcome::Ok };
        let record = StepRecord {
            name: StepName::Processing,
            start_ts: start,
            end_ts: end,
            outcome,
            artifact_count: outputs.len() as u64,
            error_message: last_error,
        };
        self.metrics.record_step(&record).await;

        if outputs.is_empty() {
            return Err(PipelineError::StageFailed {
                stage: "processing".to_string(),
                message: "no input files survived processing".to_string(),
            });
        }
        Ok((record, outputs))
    }

    /// One invocation over the whole `processed/` directory, producing
    /// `<processed-basename>_colored.tif` 1:1 with its input.
    async fn stage_colormap(
        &self,
        guard: &WorkspaceGuard,
        inputs: &[PathBuf],
    ) -> Result<(StepRecord, Vec<PathBuf>)> {
        let start = Utc::now();
        let processed_dir = guard.root().join("processed");
        let colored_dir = guard.root().join("colored");

        let expected: Vec<PathBuf> = inputs
            .iter()
            .map(|input| colored_dir.join(format!("{}_colored.tif", file_stem(input))))
            .collect();
        let dry_run_outputs: Vec<&Path> = expected.iter().map(PathBuf::as_path).collect();

        let cmd = subprocess::colorize(&processed_dir, &colored_dir, &self.ctx.model_profile.config_path);
        self.step_runner
            .run("colormap", &cmd, &dry_run_outputs)
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: "colormap".to_string(),
                message: e.to_string(),
            })?;

        let end = Utc::now();
        let record = StepRecord {
            name: StepName::Colormap,
            start_ts: start,
            end_ts: end,
            outcome: Outcome::Ok,
            artifact_count: expected.len() as u64,
            error_message: None,
        };
        self.metrics.record_step(&record).await;
        Ok((record, expected))
    }

    async fn stage_tile_generation(&self, guard: &WorkspaceGuard) -> Result<(StepRecord, Vec<PathBuf>)> {
        if !self.ctx.flags.tiles_enabled {
            let now = Utc::now();
            let record = StepRecord {
                name: StepName::TileGeneration,
                start_ts: now,
                end_ts: now,
                outcome: Outcome::Skipped,
                artifact_count: 0,
                error_message: None,
            };
            self.metrics.record_step(&record).await;
            return Ok((record, Vec::new()));
        }

        let start = Utc::now();
        let colored_dir = guard.root().join("colored");
        let tiles_dir = guard.root().join("tiles");

        let cmd = subprocess::tile_generate(
            &colored_dir,
            &tiles_dir,
            &self.ctx.flags.zoom_range,
            self.ctx.flags.tile_workers,
        );
        // There's no single fixed output filename to seed in dry-run mode
        // (the tree is `<variable>/<timestamp>/<fff>/<z>/<x>/<y>.png`, built
        // entirely by the subprocess), so touch one placeholder file deep
        // enough that `upload_tile_dir`'s walk still finds something.
        let placeholder = tiles_dir
            .join(self.primary_variable())
            .join(self.ctx.cycle.timestamp_dir())
            .join("000")
            .join("0")
            .join("0")
            .join("0.png");
        self.step_runner
            .run("tile_generation", &cmd, &[placeholder.as_path()])
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: "tile_generation".to_string(),
                message: e.to_string(),
            })?;

        let tile_count = count_files_recursive(&tiles_dir).await?;
        self.metrics.record_tiles_generated(tile_count).await;
        let end = Utc::now();
        let record = StepRecord {
            name: StepName::TileGeneration,
            start_ts: start,
            end_ts: end,
            outcome: Outcome::Ok,
            artifact_count: tile_count,
            error_message: None,
        };
        self.metrics.record_step(&record).await;
        Ok((record, vec![tiles_dir]))
    }

    async fn stage_upload(&self, colored: &[PathBuf], tile_dirs: &[PathBuf]) -> Result<StepRecord> {
        if !self.ctx.flags.upload_enabled {
            let now = Utc::now();
            let record = StepRecord {
                name: StepName::Upload,
                start_ts: now,
                end_ts: now,
                outcome: Outcome::Skipped,
                artifact_count: 0,
                error_message: None,
            };
            self.metrics.record_step(&record).await;
            return Ok(record);
        }

        let start = Utc::now();
        let mut uploaded = 0u64;

        for file in colored {
            let filename = file.file_name().unwrap().to_string_lossy();
            let key = StoragePath::colored_file(&self.ctx.model_profile, &self.ctx.cycle, &filename);
            let bytes = tokio::fs::read(file).await?;
            self.store
                .put(&key, bytes.into())
                .await
                .map_err(|e| PipelineError::StageFailed {
                    stage: "upload".to_string(),
                    message: e.to_string(),
                })?;
            uploaded += 1;
        }

        for dir in tile_dirs {
            uploaded += self.upload_tile_dir(dir).await?;
        }

        let end = Utc::now();
        let record = StepRecord {
            name: StepName::Upload,
            start_ts: start,
            end_ts: end,
            outcome: Outcome::Ok,
            artifact_count: uploaded,
            error_message: None,
        };
        self.metrics.record_step(&record).await;
        Ok(record)
    }

    /// Runs after Metadata, not a `StepRecord` stage of its own (§3's
    /// StepRecord.name enum has no Retention variant). Best-effort: a
    /// failure here is logged and counted but never changes the run's exit
    /// status, since artifacts have already been produced and published.
    /// A no-op when upload is disabled; leaves the `tiles` prefix untouched
    /// when tile generation was skipped.
    async fn run_retention(&self) {
        if !self.ctx.flags.upload_enabled {
            return;
        }
        let enforcer = RetentionEnforcer::new(&self.store);
        match enforcer
            .enforce_all(&self.ctx.model_profile, &self.ctx.cycle, self.ctx.flags.tiles_enabled)
            .await
        {
            Ok(reports) => {
                for report in &reports {
                    info!(
                        prefix = %report.prefix,
                        kept = report.kept.len(),
                        deleted = report.deleted.len(),
                        failures = report.delete_failures,
                        "retention enforced"
                    );
                    if report.delete_failures > 0 {
                        self.metrics.record_error().await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "retention enforcement failed, leaving stale objects in place");
                self.metrics.record_error().await;
            }
        }
    }

    async fn upload_tile_dir(&self, dir: &Path) -> Result<u64> {
        let mut count = 0u64;
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let relative = path.strip_prefix(&self.ctx.tiles_dir()).unwrap_or(&path);
                let key = format!(
                    "{}/{}",
                    self.ctx.model_profile.store_prefixes.tiles,
                    relative.to_string_lossy()
                );
                let bytes = tokio::fs::read(&path).await?;
                self.store
                    .put(&key, bytes.into())
                    .await
                    .map_err(|e| PipelineError::StageFailed {
                        stage: "upload".to_string(),
                        message: e.to_string(),
                    })?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn stage_metadata(&self, guard: &WorkspaceGuard) -> Result<StepRecord> {
        if !self.ctx.flags.upload_enabled {
            let now = Utc::now();
            let record = StepRecord {
                name: StepName::Metadata,
                start_ts: now,
                end_ts: now,
                outcome: Outcome::Skipped,
                artifact_count: 0,
                error_message: None,
            };
            self.metrics.record_step(&record).await;
            return Ok(record);
        }

        let start = Utc::now();
        let manifest_path = guard.root().join("latest.json");
        let cmd = subprocess::manifest_generate(
            &self.ctx.cycle.date_dashed(),
            self.ctx.cycle.hour,
            self.ctx.bucket(),
            &guard.root().join("tiles"),
            &self.ctx.model_profile.config_path,
            &self.ctx.model_profile.store_prefixes.tiles,
            &manifest_path,
        );

        let built = match self.step_runner.run("metadata", &cmd, &[manifest_path.as_path()]).await {
            Ok(_) => match tokio::fs::read(&manifest_path).await {
                Ok(bytes) => serde_json::from_slice::<Manifest>(&bytes).ok(),
                Err(_) => None,
            },
            Err(e) => {
                warn!(error = %e, "metadata generation subprocess failed, falling back to built-in template");
                None
            }
        };
        let used_fallback = built.is_none();

        let fallback = Manifest::fallback(&self.ctx.model_profile, &self.ctx.cycle, &self.ctx.forecast_hours);
        let emitter = ManifestEmitter::new(self.ctx.bucket().to_string()).await;
        let key = StoragePath::manifest_key(&self.ctx.model_profile).to_string();
        emitter
            .publish_or_fallback(&key, built, fallback)
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: "metadata".to_string(),
                message: format!("manifest publish failed: {e}"),
            })?;

        let end = Utc::now();
        let record = StepRecord {
            name: StepName::Metadata,
            start_ts: start,
            end_ts: end,
            outcome: Outcome::Ok,
            artifact_count: 1,
            error_message: used_fallback.then(|| "published fallback manifest template".to_string()),
        };
        self.metrics.record_step(&record).await;
        Ok(record)
    }

    fn primary_variable(&self) -> &str {
        self.ctx
            .model_profile
            .variables
            .first()
            .map(String::as_str)
            .unwrap_or("default")
    }
}

async fn count_files_recursive(root: &Path) -> Result<u64> {
    let mut count = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}
