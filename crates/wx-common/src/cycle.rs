use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model_profile::ModelProfile;

/// A resolved `(date, cycle_hour)` pair, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cycle {
    pub date: NaiveDate,
    pub hour: u32,
}

impl Cycle {
    pub fn new(date: NaiveDate, hour: u32) -> Self {
        Self { date, hour }
    }

    /// `YYYYMMDD` form used in object keys.
    pub fn date_compact(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn date_dashed(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn cycle_formatted(&self) -> String {
        format!("{:02}Z", self.hour)
    }

    /// `<YYYYMMDD>T<HH>z` directory segment used under tile/colored/raw prefixes.
    pub fn timestamp_dir(&self) -> String {
        format!("{}T{:02}z", self.date_compact(), self.hour)
    }

    /// The cycle's nominal run time as a UTC instant, used to compute
    /// data-age: how stale the freshest available data is relative to now.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_hms_opt(self.hour, 0, 0).expect("hour is always 0-23"))
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date_compact(), self.cycle_formatted())
    }
}

/// An explicit cycle supplied via `--cycle-override DATE:HH`, bypassing clock resolution.
#[derive(Debug, Clone, Copy)]
pub struct CycleOverride {
    pub date: NaiveDate,
    pub hour: u32,
}

impl CycleOverride {
    /// Parses `YYYYMMDD:HH`.
    pub fn parse(s: &str) -> Result<Self> {
        let (date_part, hour_part) = s.split_once(':').ok_or_else(|| {
            PipelineError::Config(format!("cycle override must be DATE:HH, got {s:?}"))
        })?;
        let date = NaiveDate::parse_from_str(date_part, "%Y%m%d")
            .map_err(|e| PipelineError::Config(format!("bad date in cycle override: {e}")))?;
        let hour: u32 = hour_part
            .parse()
            .map_err(|_| PipelineError::Config(format!("bad hour in cycle override: {hour_part:?}")))?;
        Ok(Self { date, hour })
    }
}

/// Computes the latest cycle that should already be available on the source
/// bucket: `now_utc - availability_delay_hours`, rounded down to the nearest
/// multiple of `cadence_hours`. Ties round down. An explicit override skips
/// this computation entirely but is still validated against the profile's
/// cadence.
pub fn resolve_cycle(
    now_utc: DateTime<Utc>,
    profile: &ModelProfile,
    override_cycle: Option<CycleOverride>,
) -> Result<Cycle> {
    if let Some(o) = override_cycle {
        let valid = profile.valid_cycles();
        if !valid.contains(&o.hour) {
            return Err(PipelineError::InvalidCycle {
                model: profile.name.clone(),
                hour: o.hour,
                valid,
            });
        }
        return Ok(Cycle::new(o.date, o.hour));
    }

    let adjusted = now_utc - Duration::hours(profile.availability_delay_hours as i64);
    let cadence = profile.cadence_hours.max(1);
    let rounded_hour = (adjusted.hour() / cadence) * cadence;
    Ok(Cycle::new(adjusted.date_naive(), rounded_hour))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hrrr() -> ModelProfile {
        ModelProfile::hrrr_default()
    }

    fn gfs_wave() -> ModelProfile {
        ModelProfile::gfs_wave_default()
    }

    #[test]
    fn rounds_down_to_cadence_after_delay() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 14, 45, 0).unwrap();
        let cycle = resolve_cycle(now, &hrrr(), None).unwrap();
        // delay 2h -> 12:45, cadence 1h -> hour 12
        assert_eq!(cycle.hour, 12);
        assert_eq!(cycle.date_compact(), "20260727");
    }

    #[test]
    fn gfs_wave_rounds_to_six_hour_cadence() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap();
        let cycle = resolve_cycle(now, &gfs_wave(), None).unwrap();
        // delay 5h -> 05:00, cadence 6h -> hour 0
        assert_eq!(cycle.hour, 0);
    }

    #[test]
    fn floors_to_cadence_boundary_rather_than_rounding_nearest() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let cycle = resolve_cycle(now, &gfs_wave(), None).unwrap();
        // delay 5h -> 07:00, cadence 6h -> floors to 6, never rounds up to 12
        assert_eq!(cycle.hour, 6);
    }

    #[test]
    fn crosses_midnight_into_previous_day() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 0, 30, 0).unwrap();
        let cycle = resolve_cycle(now, &hrrr(), None).unwrap();
        assert_eq!(cycle.date_compact(), "20260726");
        assert_eq!(cycle.hour, 22);
    }

    #[test]
    fn override_bypasses_clock_but_validates_cadence() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let ok = resolve_cycle(Utc::now(), &gfs_wave(), Some(CycleOverride { date, hour: 18 }));
        assert!(ok.is_ok());

        let bad = resolve_cycle(Utc::now(), &gfs_wave(), Some(CycleOverride { date, hour: 7 }));
        assert!(matches!(bad, Err(PipelineError::InvalidCycle { .. })));
    }

    #[test]
    fn as_datetime_combines_date_and_hour_in_utc() {
        let cycle = Cycle::new(NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(), 12);
        let dt = cycle.as_datetime();
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.date_naive(), cycle.date);
    }

    #[test]
    fn parses_cycle_override_string() {
        let o = CycleOverride::parse("20260727:18").unwrap();
        assert_eq!(o.hour, 18);
        assert_eq!(o.date.format("%Y%m%d").to_string(), "20260727");

        assert!(CycleOverride::parse("not-a-cycle").is_err());
    }
}
