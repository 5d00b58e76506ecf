use wx_common::{Cycle, ModelProfile};

/// Builds the object keys each pipeline stage writes under. Centralized
/// here so the layout is defined once and every stage, and the retention
/// enforcer, agree on it.
pub struct StoragePath;

impl StoragePath {
    pub fn raw_file(profile: &ModelProfile, cycle: &Cycle, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            profile.store_prefixes.raw,
            cycle.timestamp_dir(),
            filename
        )
    }

    pub fn colored_file(profile: &ModelProfile, cycle: &Cycle, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            profile.store_prefixes.colored,
            cycle.timestamp_dir(),
            filename
        )
    }

    /// Variable segment comes before the timestamp segment — this is the
    /// `--organize` layout the TileGeneration subprocess itself produces
    /// (mirrored by `upload_tile_dir`'s directory walk), not a convention
    /// this builder invents.
    pub fn tile(
        profile: &ModelProfile,
        cycle: &Cycle,
        variable: &str,
        z: u32,
        x: u32,
        y: u32,
    ) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}.png",
            profile.store_prefixes.tiles,
            variable,
            cycle.timestamp_dir(),
            z,
            x,
            y
        )
    }

    /// Prefix (no trailing slash) holding every tile dir for one cycle;
    /// used by the retention enforcer to find siblings to delete.
    pub fn raw_prefix(profile: &ModelProfile) -> &str {
        &profile.store_prefixes.raw
    }

    pub fn colored_prefix(profile: &ModelProfile) -> &str {
        &profile.store_prefixes.colored
    }

    pub fn tiles_prefix(profile: &ModelProfile) -> &str {
        &profile.store_prefixes.tiles
    }

    pub fn manifest_key(profile: &ModelProfile) -> &str {
        &profile.store_prefixes.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cycle() -> Cycle {
        Cycle::new(NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(), 12)
    }

    #[test]
    fn raw_file_path_matches_expected_layout() {
        let profile = ModelProfile::hrrr_default();
        let path = StoragePath::raw_file(&profile, &cycle(), "hrrr.t12z.wrfsfcf00.grib2");
        assert_eq!(path, "hrrr/raw/20260727T12z/hrrr.t12z.wrfsfcf00.grib2");
    }

    #[test]
    fn tile_path_matches_expected_layout() {
        let profile = ModelProfile::hrrr_default();
        let path = StoragePath::tile(&profile, &cycle(), "temp_2m", 4, 3, 6);
        assert_eq!(path, "hrrr/tiles/temp_2m/20260727T12z/4/3/6.png");
    }

    #[test]
    fn manifest_key_is_the_metadata_prefix() {
        let profile = ModelProfile::gfs_wave_default();
        assert_eq!(StoragePath::manifest_key(&profile), "gfs-wave/latest.json");
    }
}
