//! Vanilla installation into the shared version store.

use crate::config;
use crate::game::installer::progress::{InstallStage, ProgressSender};
use crate::game::installer::types::{is_safe_relative_path, InstallLayout, OsType, VersionKey};
use crate::game::metadata::types::{Artifact, VersionDescriptor, VersionDetail};
use crate::net;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

/// Parallel fan-out for library and asset downloads.
const DOWNLOAD_CONCURRENCY: usize = 8;

/// Installs the vanilla runtime for one catalog entry.
///
/// Callers check for an existing install before invoking this, so
/// implementations may assume a fresh or partially written store. Every
/// download skips files that already match their hash, which makes a
/// re-run after an aborted install cheap.
#[async_trait]
pub trait VanillaInstaller: Send + Sync {
    async fn install(
        &self,
        descriptor: &VersionDescriptor,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<()>;
}

/// Stock implementation backed by Mojang's metadata and download CDN.
pub struct HttpVanillaInstaller {
    client: Client,
    asset_objects_url: String,
}

impl HttpVanillaInstaller {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            asset_objects_url: config::ASSET_OBJECTS_URL.to_string(),
        }
    }

    pub fn with_asset_objects_url(mut self, url: impl Into<String>) -> Self {
        self.asset_objects_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn download_libraries(
        &self,
        detail: &VersionDetail,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<()> {
        let os = OsType::current();
        let libraries_dir = layout.libraries_dir();

        let mut artifacts: Vec<&Artifact> = Vec::new();
        for library in &detail.libraries {
            if !library.applies_to(os) {
                log::debug!("Skipping library {} on {}", library.name, os.as_str());
                continue;
            }
            let Some(downloads) = &library.downloads else {
                continue;
            };
            if let Some(artifact) = &downloads.artifact {
                artifacts.push(artifact);
            }
            if let Some(native) = library.native_artifact(os) {
                artifacts.push(native);
            }
        }

        artifacts.retain(|artifact| {
            if is_safe_relative_path(&artifact.path) {
                true
            } else {
                log::error!("Ignoring library with unsafe path: {}", artifact.path);
                false
            }
        });

        log::info!("Downloading {} libraries", artifacts.len());
        progress.message(
            InstallStage::InstallingLoader,
            format!("Downloading {} libraries", artifacts.len()),
        );

        let downloads: Vec<_> = artifacts
            .into_iter()
            .map(|artifact| {
                let client = self.client.clone();
                let path = libraries_dir.join(&artifact.path);
                async move {
                    net::download_to_path(&client, &artifact.url, &path, Some(&artifact.sha1))
                        .await
                        .with_context(|| format!("Failed to download library {}", artifact.path))
                }
            })
            .collect();
        stream::iter(downloads)
            .buffer_unordered(DOWNLOAD_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    async fn download_assets(
        &self,
        detail: &VersionDetail,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<()> {
        let Some(index_ref) = &detail.asset_index else {
            log::debug!("Version {} declares no asset index", detail.id);
            return Ok(());
        };

        let index_path = layout
            .assets_dir()
            .join("indexes")
            .join(format!("{}.json", index_ref.id));
        net::download_to_path(&self.client, &index_ref.url, &index_path, Some(&index_ref.sha1))
            .await
            .context("Failed to download the asset index")?;

        let bytes = tokio::fs::read(&index_path)
            .await
            .context("Failed to read the asset index")?;
        let index: AssetIndexFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Unexpected asset index shape for {}", index_ref.id))?;

        let objects_dir = layout.assets_dir().join("objects");
        let total = index.objects.len();
        log::info!("Downloading {} assets for index {}", total, index_ref.id);
        progress.message(
            InstallStage::InstallingLoader,
            format!("Downloading {} assets", total),
        );

        stream::iter(index.objects.into_values())
            .map(|object| {
                let client = self.client.clone();
                let url = format!(
                    "{}/{}/{}",
                    self.asset_objects_url,
                    &object.hash[..2],
                    object.hash
                );
                let path = objects_dir.join(&object.hash[..2]).join(&object.hash);
                async move {
                    net::download_to_path(&client, &url, &path, Some(&object.hash))
                        .await
                        .with_context(|| format!("Failed to download asset {}", object.hash))
                }
            })
            .buffer_unordered(DOWNLOAD_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AssetIndexFile {
    objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Deserialize)]
struct AssetObject {
    hash: String,
}

#[async_trait]
impl VanillaInstaller for HttpVanillaInstaller {
    async fn install(
        &self,
        descriptor: &VersionDescriptor,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<()> {
        let key = VersionKey::from_raw(&descriptor.id);
        log::info!("Installing vanilla {}", descriptor.id);
        progress.message(
            InstallStage::InstallingLoader,
            format!("Fetching metadata for {}", descriptor.id),
        );

        // The descriptor file on disk must keep every field the service
        // returned, including the ones this crate never reads, so the raw
        // document is written and the typed view parsed from it afterwards.
        let raw: serde_json::Value = net::get_json(&self.client, &descriptor.url)
            .await
            .with_context(|| format!("Failed to fetch version metadata for {}", descriptor.id))?;

        tokio::fs::create_dir_all(layout.version_dir(&key))
            .await
            .context("Failed to create the version directory")?;
        tokio::fs::write(layout.descriptor_path(&key), serde_json::to_vec_pretty(&raw)?)
            .await
            .context("Failed to write the version descriptor")?;

        let detail: VersionDetail = serde_json::from_value(raw)
            .with_context(|| format!("Unexpected version metadata shape for {}", descriptor.id))?;

        let client_download = detail
            .downloads
            .get("client")
            .with_context(|| format!("Version {} has no client download", descriptor.id))?;
        progress.message(
            InstallStage::InstallingLoader,
            format!("Downloading client jar for {}", descriptor.id),
        );
        net::download_to_path(
            &self.client,
            &client_download.url,
            &layout.client_jar_path(&key),
            Some(&client_download.sha1),
        )
        .await
        .context("Failed to download the client jar")?;

        self.download_libraries(&detail, layout, progress).await?;
        self.download_assets(&detail, layout, progress).await?;

        log::info!("Vanilla {} installed", descriptor.id);
        Ok(())
    }
}
