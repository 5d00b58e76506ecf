use std::path::Path;

use wx_common::Command;

/// Argv builders for the opaque geospatial tools each strict/tolerant
/// stage invokes. The engine never inspects what these tools do
/// internally — it only knows their documented CLI contract: program
/// name, required flags, and exit-status conventions (0 success,
/// non-zero failure, stderr carries the diagnostic).

/// Download: one invocation per cycle, fetches every requested forecast
/// hour in a single call. `fxx_spec` is the raw forecast-hour spec string
/// (e.g. `"0-18"`), forwarded verbatim rather than the parsed hour list.
pub fn download(date: &str, cycle_hour: u32, fxx_spec: &str, output_dir: &Path) -> Command {
    Command::new("grib2-downloader")
        .arg("--date")
        .arg(date)
        .arg(format!("--cycle={cycle_hour:02}"))
        .arg("--fxx")
        .arg(fxx_spec)
        .arg("--variables")
        .arg("all")
        .arg("--output-dir")
        .arg(output_dir.to_string_lossy().into_owned())
        .arg("--keep-local")
}

/// Processing: one invocation per downloaded file (the only tolerant
/// stage — a single failing invocation doesn't fail the others).
pub fn grib2_to_cog(input: &Path, output_dir: &Path, config_path: &str, priority: u8) -> Command {
    Command::new("grib2-to-cog")
        .arg("--input")
        .arg(input.to_string_lossy().into_owned())
        .arg("--output")
        .arg(output_dir.to_string_lossy().into_owned())
        .arg("--config")
        .arg(config_path)
        .arg("--priority")
        .arg(priority.to_string())
}

/// Colormap: one invocation per cycle over the whole `processed/` directory.
pub fn colorize(input_dir: &Path, output_dir: &Path, config_path: &str) -> Command {
    Command::new("wx-colorize")
        .arg("--input")
        .arg(input_dir.to_string_lossy().into_owned())
        .arg("--output")
        .arg(output_dir.to_string_lossy().into_owned())
        .arg("--config")
        .arg(config_path)
}

/// TileGeneration: one invocation per cycle over the whole `colored/`
/// directory; tile workers are children of this subprocess, not of the
/// engine.
pub fn tile_generate(input_dir: &Path, output_dir: &Path, zoom_range: &str, workers: usize) -> Command {
    Command::new("wx-tile-gen")
        .arg("--input")
        .arg(input_dir.to_string_lossy().into_owned())
        .arg("--output")
        .arg(output_dir.to_string_lossy().into_owned())
        .arg("--zoom")
        .arg(zoom_range)
        .arg("--processes")
        .arg(workers.to_string())
        .arg("--exclude-transparent")
        .arg("--organize")
}

#[allow(clippy::too_many_arguments)]
pub fn manifest_generate(
    date: &str,
    cycle_hour: u32,
    bucket: &str,
    tiles_dir: &Path,
    config_path: &str,
    s3_prefix: &str,
    output: &Path,
) -> Command {
    Command::new("wx-manifest-gen")
        .arg("--date")
        .arg(date)
        .arg(format!("--cycle={cycle_hour:02}"))
        .arg("--s3-bucket")
        .arg(bucket)
        .arg("--tiles-dir")
        .arg(tiles_dir.to_string_lossy().into_owned())
        .arg("--config")
        .arg(config_path)
        .arg("--s3-prefix")
        .arg(s3_prefix)
        .arg("--output")
        .arg(output.to_string_lossy().into_owned())
}
