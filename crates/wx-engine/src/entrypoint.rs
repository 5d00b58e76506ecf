use std::io::Write as _;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use wx_common::{
    load_profile_or_default, parse_forecast_hour_spec, resolve_cycle, CycleOverride, Flags,
    PipelineError, RunContext,
};
use wx_metrics::{CloudWatchPublisher, MetricSink};
use wx_store::{ObjectStoreClient, ObjectStoreConfig};

use crate::cli::PipelineArgs;
use crate::driver::PipelineDriver;

/// Exit code reserved for "another run already holds the workspace lock".
pub const EXIT_ALREADY_RUNNING: i32 = 2;

/// Shared `main` body for both model binaries: parse args, resolve the
/// run context, wire up metrics and storage, run the pipeline, and map
/// the result onto a process exit code. `model_name` selects which
/// hardcoded default profile backs `--config-dir` when no override file
/// exists there.
pub async fn run_model(model_name: &str) -> i32 {
    dotenvy::dotenv().ok();
    let args = PipelineArgs::parse();

    let (profile, cycle) = match resolve_profile_and_cycle(model_name, &args) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("pipeline setup failed before logging was configured: {e}");
            return 1;
        }
    };
    init_tracing(&args.log_level, &args.log_dir, &cycle);

    match run_model_inner(args, profile, cycle).await {
        Ok(()) => 0,
        Err(PipelineError::AlreadyRunning(path)) => {
            warn!(lock_path = %path.display(), "another run already holds the workspace lock");
            EXIT_ALREADY_RUNNING
        }
        Err(e) => {
            error!(error = %e, "pipeline run failed");
            1
        }
    }
}

/// Resolves just enough to name the per-run log file (§6: `pipeline_
/// <YYYYMMDD>_<HH>00.log`, named from the cycle rather than wall-clock
/// time) before tracing is initialized, so a bad config or cycle override
/// can still be reported — just to stderr instead of the structured log.
fn resolve_profile_and_cycle(
    model_name: &str,
    args: &PipelineArgs,
) -> wx_common::Result<(wx_common::ModelProfile, wx_common::Cycle)> {
    let profile = load_profile_or_default(&args.config_dir, model_name)?;
    let cycle_override = args
        .cycle_override
        .as_deref()
        .map(CycleOverride::parse)
        .transpose()?;
    let cycle = resolve_cycle(chrono::Utc::now(), &profile, cycle_override)?;
    Ok((profile, cycle))
}

async fn run_model_inner(
    args: PipelineArgs,
    profile: wx_common::ModelProfile,
    cycle: wx_common::Cycle,
) -> wx_common::Result<()> {
    let forecast_spec = args
        .forecast_hours
        .as_deref()
        .unwrap_or(&profile.default_forecast_hours)
        .to_string();
    let forecast_hours = parse_forecast_hour_spec(&forecast_spec)?;

    let run_id = Uuid::new_v4();
    let workspace_root = args.work_dir.join(&profile.name).join(cycle.timestamp_dir());

    let flags = Flags {
        dry_run: args.dry_run,
        upload_enabled: args.enable_s3,
        tiles_enabled: !args.disable_tiles,
        priority: args.priority,
        zoom_range: args.zoom.clone(),
        tile_workers: args.tile_workers,
        max_run_secs: args.max_run_secs,
        forecast_hour_spec: forecast_spec.clone(),
    };

    let ctx = RunContext {
        run_id,
        model_profile: profile,
        cycle,
        forecast_hours,
        workspace_root,
        log_dir: args.log_dir.clone(),
        bucket_override: args.s3_bucket.clone(),
        flags,
        started_at: chrono::Utc::now(),
    };

    info!(
        run_id = %ctx.run_id,
        model = %ctx.model_profile.name,
        cycle = %ctx.cycle,
        forecast_hour_count = ctx.forecast_hours.len(),
        dry_run = ctx.flags.dry_run,
        "starting pipeline run"
    );

    let store_config = ObjectStoreConfig {
        bucket: ctx.bucket().to_string(),
        endpoint: std::env::var("S3_ENDPOINT").ok(),
        access_key_id: std::env::var("S3_ACCESS_KEY").ok(),
        secret_access_key: std::env::var("S3_SECRET_KEY").ok(),
        region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        allow_http: std::env::var("S3_ALLOW_HTTP").map(|v| v == "true").unwrap_or(false),
    };
    let store = ObjectStoreClient::new(&store_config).map_err(PipelineError::Other)?;

    let publisher = CloudWatchPublisher::new("WeatherPipeline").await;
    let metrics = MetricSink::new(publisher, ctx.run_id, ctx.model_profile.name.clone());

    let driver = PipelineDriver::new(ctx, metrics, store);
    run_with_shutdown(driver).await
}

/// Races the pipeline against SIGINT/SIGTERM. If a signal wins, the run
/// future is dropped mid-flight; its locally owned `WorkspaceGuard` and
/// lock guard still run their `Drop` impls as the future unwinds, so
/// cleanup happens without a dedicated shutdown handler inside the driver.
async fn run_with_shutdown<P: wx_metrics::MetricsPublisher>(
    driver: PipelineDriver<P>,
) -> wx_common::Result<()> {
    let run_future = driver.run();
    tokio::pin!(run_future);

    tokio::select! {
        result = &mut run_future => result.map(|_| ()),
        _ = shutdown_signal() => {
            warn!("received shutdown signal, cancelling run");
            Err(PipelineError::StageFailed {
                stage: "run".to_string(),
                message: "interrupted by shutdown signal".to_string(),
            })
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Writes every log line to both stdout and a per-run file under
/// `log_dir`, so a run's full log survives even when the container's
/// stdout capture is lossy or rotated away.
struct DualWriter {
    file: std::fs::File,
}

impl std::io::Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::Write::write_all(&mut std::io::stdout(), buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::Write::flush(&mut std::io::stdout())?;
        self.file.flush()
    }
}

fn init_tracing(log_level: &str, log_dir: &PathBuf, cycle: &wx_common::Cycle) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if std::fs::create_dir_all(log_dir).is_err() {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_target(false).init();
        return;
    }

    let log_path = log_dir.join(format!("pipeline_{}_{:02}00.log", cycle.date_compact(), cycle.hour));
    match std::fs::File::create(&log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(move || DualWriter {
                    file: file.try_clone().expect("failed to clone run log file handle"),
                })
                .init();
        }
        Err(_) => {
            tracing_subscriber::fmt().json().with_env_filter(filter).with_target(false).init();
        }
    }
}
