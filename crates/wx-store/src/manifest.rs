use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use wx_common::{Cycle, ModelProfile};

const MANIFEST_VERSION: &str = "1";
const CACHE_CONTROL: &str = "max-age=300";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRun {
    pub date: String,
    pub cycle: u32,
    pub cycle_formatted: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestVariable {
    pub name: String,
    pub display_name: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileInfo {
    pub url_template: String,
    pub format: String,
    pub tile_size: u32,
}

/// The `latest.json` freshness manifest every run publishes, success or
/// fallback alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub model: String,
    pub model_run: ModelRun,
    pub forecast_hours: Vec<String>,
    pub variables: Vec<ManifestVariable>,
    pub tiles: TileInfo,
    pub generated_at: String,
}

impl Manifest {
    pub fn build(
        profile: &ModelProfile,
        cycle: &Cycle,
        forecast_hours: &[u32],
        variables: Vec<ManifestVariable>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            model: profile.name.clone(),
            model_run: ModelRun {
                date: cycle.date_dashed(),
                cycle: cycle.hour,
                cycle_formatted: cycle.cycle_formatted(),
                timestamp: cycle.timestamp_dir(),
            },
            forecast_hours: forecast_hours.iter().map(|h| format!("f{h:03}")).collect(),
            variables,
            tiles: TileInfo {
                url_template: format!(
                    "{}/{{variable}}/{{z}}/{{x}}/{{y}}.png",
                    profile.store_prefixes.tiles
                ),
                format: "png".to_string(),
                tile_size: 256,
            },
            generated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Built-in template used when the metadata-generation subprocess
    /// fails. Same shape as a successful manifest but with no variables
    /// listed, so consumers can tell a degraded manifest from a normal
    /// empty-forecast one and the tile pyramid is still discoverable.
    pub fn fallback(profile: &ModelProfile, cycle: &Cycle, forecast_hours: &[u32]) -> Self {
        Self::build(profile, cycle, forecast_hours, Vec::new())
    }
}

/// Publishes the manifest to the private bucket with a short cache
/// lifetime, using the AWS SDK directly (rather than the generic
/// `object_store` client) because only the SDK exposes per-object
/// `Cache-Control`.
pub struct ManifestEmitter {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl ManifestEmitter {
    pub async fn new(bucket: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.into(),
        }
    }

    pub async fn publish(&self, key: &str, manifest: &Manifest) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(manifest)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .cache_control(CACHE_CONTROL)
            .body(ByteStream::from(body))
            .send()
            .await?;
        Ok(())
    }

    /// Publishes `built` if present, otherwise publishes `fallback`. Either
    /// way a manifest reaches the bucket — the metadata stage never leaves
    /// `latest.json` missing.
    pub async fn publish_or_fallback(
        &self,
        key: &str,
        built: Option<Manifest>,
        fallback: Manifest,
    ) -> anyhow::Result<()> {
        let manifest = match built {
            Some(m) => m,
            None => {
                warn!("metadata subprocess produced no manifest, publishing fallback template");
                fallback
            }
        };
        self.publish(key, &manifest).await
    }
}
