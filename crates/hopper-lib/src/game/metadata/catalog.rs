//! Vanilla version catalog: one manifest fetch per session, linear id
//! lookups against the cached list.

use crate::config::VERSION_MANIFEST_URL;
use crate::game::metadata::types::{VersionDescriptor, VersionManifest};
use crate::net::get_json;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct VersionCatalog {
    client: Client,
    manifest_url: String,
    retry: RetryPolicy,
    cached: Mutex<Option<CachedManifest>>,
}

struct CachedManifest {
    manifest: Arc<VersionManifest>,
    fetched_at: DateTime<Utc>,
}

impl VersionCatalog {
    pub fn new(client: Client) -> Self {
        Self::with_manifest_url(client, VERSION_MANIFEST_URL)
    }

    pub fn with_manifest_url(client: Client, manifest_url: impl Into<String>) -> Self {
        Self {
            client,
            manifest_url: manifest_url.into(),
            retry: RetryPolicy::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn manifest(&self) -> Result<Arc<VersionManifest>> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            log::debug!(
                "Serving version manifest cached at {}",
                entry.fetched_at.to_rfc3339()
            );
            return Ok(Arc::clone(&entry.manifest));
        }

        log::info!("Fetching version manifest from {}", self.manifest_url);
        let manifest: VersionManifest = self
            .retry
            .run("version manifest", || {
                get_json(&self.client, &self.manifest_url)
            })
            .await
            .context("Failed to fetch the version manifest")?;
        log::info!("Fetched {} game versions", manifest.versions.len());

        let manifest = Arc::new(manifest);
        *cached = Some(CachedManifest {
            manifest: Arc::clone(&manifest),
            fetched_at: Utc::now(),
        });
        Ok(manifest)
    }

    /// Every known version, newest first as the manifest lists them.
    pub async fn all(&self) -> Result<Vec<VersionDescriptor>> {
        Ok(self.manifest().await?.versions.clone())
    }

    /// Resolve a version id to its descriptor.
    pub async fn resolve(&self, id: &str) -> Result<VersionDescriptor> {
        let manifest = self.manifest().await?;
        manifest
            .versions
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .with_context(|| format!("Version {} not found in the manifest", id))
    }

    pub async fn latest_release(&self) -> Result<String> {
        Ok(self.manifest().await?.latest.release.clone())
    }
}
