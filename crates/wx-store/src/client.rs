use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjPath;
use object_store::ObjectStore;

/// Connection details for the private tile bucket. Mirrors a MinIO/S3
/// endpoint the same way the public NOAA buckets are addressed upstream.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub allow_http: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: Some("http://localhost:9000".to_string()),
            bucket: "weather-tiles".to_string(),
            access_key_id: Some("minioadmin".to_string()),
            secret_access_key: Some("minioadmin".to_string()),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

/// Thin wrapper around an `object_store` backend for the operations the
/// pipeline needs: put, list, and delete under the bucket configured for
/// this run.
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreClient {
    pub fn new(config: &ObjectStoreConfig) -> anyhow::Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build()?;
        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn put(&self, key: &str, bytes: Bytes) -> anyhow::Result<()> {
        self.store.put(&ObjPath::from(key), bytes.into()).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Bytes> {
        let result = self.store.get(&ObjPath::from(key)).await?;
        Ok(result.bytes().await?)
    }

    pub async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self.store.head(&ObjPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every key under `prefix`, depth-unlimited.
    pub async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let prefix_path = ObjPath::from(prefix);
        let keys: Vec<String> = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        Ok(keys)
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.store.delete(&ObjPath::from(key)).await?;
        Ok(())
    }
}

impl ObjectStoreClient {
    /// Builds a client directly from an already-constructed store, for
    /// tests that want to seed an in-memory backend without going through
    /// the S3 builder.
    #[cfg(test)]
    pub(crate) fn from_store_for_test(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }
}
