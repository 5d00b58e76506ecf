use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Object-store prefixes a profile writes under. Kept disjoint across
/// profiles so two models sharing a bucket never collide on retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePrefixes {
    pub raw: String,
    pub colored: String,
    pub tiles: String,
    pub metadata: String,
}

/// Everything the engine needs to run one model end to end. HRRR and
/// GFS-Wave differ only in the values here, never in engine code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    pub bucket: String,
    pub cadence_hours: u32,
    pub availability_delay_hours: u32,
    pub default_forecast_hours: String,
    /// Path to the variables-and-colour-ramps YAML consumed by the
    /// Processing and Colormap subprocesses via their `--config` flag.
    /// Opaque to the engine beyond passing the path through.
    pub config_path: String,
    pub store_prefixes: StorePrefixes,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default = "default_recommended_cron")]
    pub recommended_cron: String,
}

fn default_recommended_cron() -> String {
    "*/15 * * * *".to_string()
}

impl ModelProfile {
    /// Every hour-of-day that is a legal cycle start for this model.
    pub fn valid_cycles(&self) -> Vec<u32> {
        let cadence = self.cadence_hours.max(1);
        (0..24).step_by(cadence as usize).collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let profile: ModelProfile = serde_yaml::from_str(&raw)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cadence_hours == 0 || 24 % self.cadence_hours != 0 {
            return Err(PipelineError::Config(format!(
                "model {} has cadence_hours={} which does not evenly divide a day",
                self.name, self.cadence_hours
            )));
        }
        for (label, prefix) in [
            ("raw", &self.store_prefixes.raw),
            ("colored", &self.store_prefixes.colored),
            ("tiles", &self.store_prefixes.tiles),
            ("metadata", &self.store_prefixes.metadata),
        ] {
            if prefix.trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "model {} is missing a {label} prefix",
                    self.name
                )));
            }
        }
        if self.config_path.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "model {} is missing a config_path",
                self.name
            )));
        }
        Ok(())
    }

    pub fn hrrr_default() -> Self {
        Self {
            name: "hrrr".to_string(),
            bucket: "weather-tiles".to_string(),
            cadence_hours: 1,
            availability_delay_hours: 2,
            default_forecast_hours: "0-18".to_string(),
            config_path: "config/variables/hrrr.yaml".to_string(),
            store_prefixes: StorePrefixes {
                raw: "hrrr/raw".to_string(),
                colored: "hrrr/colored".to_string(),
                tiles: "hrrr/tiles".to_string(),
                metadata: "hrrr/latest.json".to_string(),
            },
            variables: vec!["temp_2m".to_string(), "wind_10m".to_string(), "refc".to_string()],
            recommended_cron: "5,20,35,50 * * * *".to_string(),
        }
    }

    pub fn gfs_wave_default() -> Self {
        Self {
            name: "gfs-wave".to_string(),
            bucket: "weather-tiles".to_string(),
            cadence_hours: 6,
            availability_delay_hours: 5,
            default_forecast_hours: "0-384:3".to_string(),
            config_path: "config/variables/gfs-wave.yaml".to_string(),
            store_prefixes: StorePrefixes {
                raw: "gfs-wave/raw".to_string(),
                colored: "gfs-wave/colored".to_string(),
                tiles: "gfs-wave/tiles".to_string(),
                metadata: "gfs-wave/latest.json".to_string(),
            },
            variables: vec!["htsgw".to_string(), "perpw".to_string()],
            recommended_cron: "30 */6 * * *".to_string(),
        }
    }
}

/// Debug-time-only check that no two profiles sharing a bucket write to
/// overlapping prefixes. Intended to be called from the binaries that wire
/// up profiles at startup, and from tests — never from hot-path code.
pub fn debug_assert_disjoint_prefixes(profiles: &[&ModelProfile]) {
    if !cfg!(debug_assertions) {
        return;
    }
    for (i, a) in profiles.iter().enumerate() {
        for b in &profiles[i + 1..] {
            if a.bucket != b.bucket {
                continue;
            }
            let a_prefixes = [
                &a.store_prefixes.raw,
                &a.store_prefixes.colored,
                &a.store_prefixes.tiles,
                &a.store_prefixes.metadata,
            ];
            let b_prefixes = [
                &b.store_prefixes.raw,
                &b.store_prefixes.colored,
                &b.store_prefixes.tiles,
                &b.store_prefixes.metadata,
            ];
            for ap in a_prefixes {
                for bp in b_prefixes {
                    debug_assert!(
                        !ap.starts_with(bp.as_str()) && !bp.starts_with(ap.as_str()),
                        "model profiles {} and {} share overlapping prefixes {ap} / {bp}",
                        a.name,
                        b.name
                    );
                }
            }
        }
    }
}

/// Parses a forecast-hour spec: a comma-separated list of single hours
/// (`0`), ranges (`0-18`), or stepped ranges (`0-384:3`). Used both for a
/// profile's `default_forecast_hours` and the `--forecast-hours` override.
pub fn parse_forecast_hour_spec(spec: &str) -> Result<Vec<u32>> {
    let bad = || PipelineError::Config(format!("invalid forecast-hour spec {spec:?}"));

    let mut hours = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (range, step) = match part.split_once(':') {
            Some((range, step)) => (range, step.trim().parse::<u32>().map_err(|_| bad())?),
            None => (part, 1),
        };
        if step == 0 {
            return Err(bad());
        }
        match range.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| bad())?;
                let end: u32 = end.trim().parse().map_err(|_| bad())?;
                if end < start {
                    return Err(PipelineError::Config(format!(
                        "invalid forecast-hour range {range:?} in spec {spec:?}: end before start"
                    )));
                }
                hours.extend((start..=end).step_by(step as usize));
            }
            None => {
                hours.push(range.parse().map_err(|_| bad())?);
            }
        }
    }
    hours.sort_unstable();
    hours.dedup();
    if hours.is_empty() {
        return Err(PipelineError::Config(format!(
            "forecast-hour spec {spec:?} produced no hours"
        )));
    }
    Ok(hours)
}

/// Loads a `ModelProfile` from `<config_dir>/<name>.yaml`, falling back to
/// the matching hardcoded default when the file does not exist. Mirrors
/// the CLI > env > file > hardcoded-default layering used across the
/// pipeline's configuration surface.
pub fn load_profile_or_default(config_dir: &Path, name: &str) -> Result<ModelProfile> {
    let path: PathBuf = config_dir.join(format!("{name}.yaml"));
    if path.exists() {
        return ModelProfile::load(&path);
    }
    match name {
        "hrrr" => Ok(ModelProfile::hrrr_default()),
        "gfs-wave" => Ok(ModelProfile::gfs_wave_default()),
        other => Err(PipelineError::Config(format!(
            "no config file at {} and no hardcoded default for model {other:?}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hrrr_valid_cycles_is_every_hour() {
        let p = ModelProfile::hrrr_default();
        assert_eq!(p.valid_cycles().len(), 24);
    }

    #[test]
    fn gfs_wave_valid_cycles_is_four_synoptic_hours() {
        let p = ModelProfile::gfs_wave_default();
        assert_eq!(p.valid_cycles(), vec![0, 6, 12, 18]);
    }

    #[test]
    fn defaults_have_disjoint_prefixes() {
        let hrrr = ModelProfile::hrrr_default();
        let gfs = ModelProfile::gfs_wave_default();
        debug_assert_disjoint_prefixes(&[&hrrr, &gfs]);
    }

    #[test]
    fn parses_range_spec() {
        assert_eq!(parse_forecast_hour_spec("0-3").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn parses_single_hour_spec() {
        assert_eq!(parse_forecast_hour_spec("12").unwrap(), vec![12]);
    }

    #[test]
    fn parses_mixed_list_and_dedups() {
        assert_eq!(
            parse_forecast_hour_spec("0,0-2,5").unwrap(),
            vec![0, 1, 2, 5]
        );
    }

    #[test]
    fn parses_stepped_range() {
        assert_eq!(
            parse_forecast_hour_spec("0-9:3").unwrap(),
            vec![0, 3, 6, 9]
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(parse_forecast_hour_spec("5-2").is_err());
    }

    #[test]
    fn parse_yaml_profile() {
        let yaml = r#"
name: hrrr
bucket: weather-tiles
cadence_hours: 1
availability_delay_hours: 2
default_forecast_hours: "0-18"
config_path: config/variables/hrrr.yaml
store_prefixes:
  raw: hrrr/raw
  colored: hrrr/colored
  tiles: hrrr/tiles
  metadata: hrrr/latest.json
"#;
        let profile: ModelProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile.name, "hrrr");
        assert_eq!(profile.recommended_cron, "*/15 * * * *");
        profile.validate().unwrap();
    }

    #[test]
    fn rejects_cadence_that_does_not_divide_a_day() {
        let mut p = ModelProfile::hrrr_default();
        p.cadence_hours = 5;
        assert!(p.validate().is_err());
    }
}
