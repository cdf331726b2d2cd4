//! Fabric profile installation.
//!
//! Fabric needs no jar download of its own. The loader metadata service
//! serves a complete version descriptor; writing it under the canonical
//! key is the whole install. The libraries it lists are resolved from the
//! descriptor at launch time.

use crate::config;
use crate::game::installer::progress::{InstallStage, ProgressSender};
use crate::game::installer::types::{InstallLayout, LoaderSpec, VersionKey};
use crate::game::installer::LoaderInstaller;
use crate::net;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::Client;

pub struct FabricInstaller {
    client: Client,
    meta_url: String,
    retry: RetryPolicy,
}

impl FabricInstaller {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            meta_url: config::FABRIC_META_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_meta_url(mut self, url: impl Into<String>) -> Self {
        self.meta_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn install_profile(
        &self,
        spec: &LoaderSpec,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<VersionKey> {
        let loader_version = spec
            .loader_version
            .as_deref()
            .context("Fabric installation requires a loader version")?;
        let key = spec.version_key();

        log::info!(
            "Installing fabric {} for minecraft {}",
            loader_version,
            spec.mc_version
        );
        progress.message(
            InstallStage::InstallingLoader,
            format!("Preparing fabric {}", loader_version),
        );

        let url = format!(
            "{}/{}/{}/profile/json",
            self.meta_url, spec.mc_version, loader_version
        );
        let mut profile: serde_json::Value = self
            .retry
            .run("fabric profile", || net::get_json(&self.client, &url))
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch the fabric profile for {} / {}",
                    spec.mc_version, loader_version
                )
            })?;

        // The meta service names the profile after its own conventions; the
        // id must match the folder name for the descriptor to resolve.
        let fields = profile
            .as_object_mut()
            .with_context(|| format!("Unexpected profile shape from {}", url))?;
        fields.insert(
            "id".to_string(),
            serde_json::Value::String(key.as_str().to_string()),
        );

        tokio::fs::create_dir_all(layout.version_dir(&key))
            .await
            .context("Failed to create the version directory")?;
        let descriptor_path = layout.descriptor_path(&key);
        tokio::fs::write(&descriptor_path, serde_json::to_vec_pretty(&profile)?)
            .await
            .context("Failed to write the fabric descriptor")?;

        log::info!("Wrote fabric descriptor {}", descriptor_path.display());
        Ok(key)
    }
}

impl LoaderInstaller for FabricInstaller {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderSpec,
        layout: &'a InstallLayout,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<VersionKey>> {
        Box::pin(self.install_profile(spec, layout, progress))
    }
}
