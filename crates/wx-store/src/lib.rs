//! Object storage client, key layout, retention enforcement and manifest
//! publishing for the private tile bucket.

pub mod client;
pub mod manifest;
pub mod path;
pub mod retention;

pub use client::{ObjectStoreClient, ObjectStoreConfig};
pub use manifest::{Manifest, ManifestEmitter, ManifestVariable, ModelRun, TileInfo};
pub use path::StoragePath;
pub use retention::{RetentionEnforcer, RetentionReport};
