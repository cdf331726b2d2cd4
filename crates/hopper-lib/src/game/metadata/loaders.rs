//! Loader metadata lookups: fabric loader listings per Minecraft version
//! and the static forge promotions document.

use crate::game::metadata::types::{
    FabricLoaderEntry, FabricLoaderVersion, ForgePromotions, ForgeVersion,
};
use crate::net::get_json;
use anyhow::{Context, Result};
use reqwest::Client;

/// Fabric loader versions compatible with `mc_version`, newest first as the
/// meta service orders them.
pub async fn fabric_loader_versions(
    client: &Client,
    fabric_meta: &str,
    mc_version: &str,
) -> Result<Vec<FabricLoaderVersion>> {
    let url = format!("{}/{}", fabric_meta.trim_end_matches('/'), mc_version);
    let entries: Vec<FabricLoaderEntry> = get_json(client, &url)
        .await
        .with_context(|| format!("Failed to list fabric loaders for {}", mc_version))?;

    Ok(entries
        .into_iter()
        .map(|e| FabricLoaderVersion {
            version: e.loader.version,
            stable: e.loader.stable,
        })
        .collect())
}

/// The newest fabric loader for `mc_version`. Used as the single recovery
/// value when an explicit loader version turns out to be invalid.
pub async fn latest_fabric_loader(
    client: &Client,
    fabric_meta: &str,
    mc_version: &str,
) -> Result<String> {
    let versions = fabric_loader_versions(client, fabric_meta, mc_version).await?;
    versions
        .into_iter()
        .next()
        .map(|v| v.version)
        .with_context(|| format!("No fabric loader is available for {}", mc_version))
}

/// Promoted forge versions for `mc_version`, recommended first.
pub async fn forge_versions_for(
    client: &Client,
    promotions_url: &str,
    mc_version: &str,
) -> Result<Vec<ForgeVersion>> {
    let promotions: ForgePromotions = get_json(client, promotions_url)
        .await
        .context("Failed to fetch forge promotions")?;
    Ok(promotions.versions_for(mc_version))
}
