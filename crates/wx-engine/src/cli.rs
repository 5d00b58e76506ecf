use std::path::PathBuf;

use clap::Parser;

/// Flags shared by every model's pipeline binary. Each has an env-var
/// twin so a deployment can be driven entirely from the environment
/// (container orchestrator, cron wrapper) without a generated command
/// line. Precedence is CLI flag, then env var, then the value baked into
/// the model profile.
#[derive(Debug, Clone, Parser)]
pub struct PipelineArgs {
    /// Directory holding `<model>.yaml` profile overrides.
    #[arg(long, env = "CONFIG_DIR", default_value = "config/profiles")]
    pub config_dir: PathBuf,

    /// Scratch workspace root; scratch dirs are created under and removed
    /// from here on every exit path.
    #[arg(long, env = "WORK_DIR", default_value = "/tmp/wx-pipeline")]
    pub work_dir: PathBuf,

    /// Directory the per-run log file is written to, in addition to stdout.
    #[arg(long, env = "LOG_DIR", default_value = "/tmp/wx-pipeline/logs")]
    pub log_dir: PathBuf,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Skip every subprocess invocation, writing placeholder outputs
    /// instead. Intended for dry-run smoke tests of the orchestration
    /// logic itself.
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// `YYYYMMDD:HH` — bypass clock resolution and process this exact
    /// cycle instead of the latest available one.
    #[arg(long, env = "CYCLE_OVERRIDE")]
    pub cycle_override: Option<String>,

    /// Forecast-hour spec, e.g. `0-18` or `0-384:3`. Defaults to the
    /// model profile's `default_forecast_hours`.
    #[arg(long, env = "FORECAST_HOURS")]
    pub forecast_hours: Option<String>,

    /// Zoom levels to tile, e.g. `0-8`.
    #[arg(long, env = "ZOOM", default_value = "0-8")]
    pub zoom: String,

    #[arg(long, env = "TILE_WORKERS", default_value_t = 4)]
    pub tile_workers: usize,

    /// Subprocess priority hint, 1 (lowest) .. 3 (highest).
    #[arg(long, env = "PRIORITY", default_value_t = 2)]
    pub priority: u8,

    /// Hard wall-clock budget for the whole run; exceeding it aborts the
    /// run as a strict failure.
    #[arg(long, env = "MAX_RUN_SECS")]
    pub max_run_secs: Option<u64>,

    #[arg(long, env = "ENABLE_S3", default_value_t = true)]
    pub enable_s3: bool,

    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: Option<String>,

    #[arg(long, env = "DISABLE_TILES")]
    pub disable_tiles: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_only_required_defaults() {
        let args = PipelineArgs::parse_from(["hrrr-pipeline"]);
        assert_eq!(args.zoom, "0-8");
        assert_eq!(args.priority, 2);
        assert!(args.enable_s3);
        assert!(!args.dry_run);
    }

    #[test]
    fn parses_cycle_override_flag() {
        let args = PipelineArgs::parse_from(["hrrr-pipeline", "--cycle-override", "20260727:12"]);
        assert_eq!(args.cycle_override.as_deref(), Some("20260727:12"));
    }
}
