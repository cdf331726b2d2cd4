use crate::marketplace::{
    ContentType, FileRef, Platform, PlatformClient, ReleaseChannel, SearchHit, SearchQuery,
    VersionEntry, VersionFile,
};
use crate::config::MODRINTH_API_URL;
use crate::net::get_json;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Modpack searches page at 20, mod and resource pack searches at 30.
fn page_limit(content_type: ContentType) -> u32 {
    match content_type {
        ContentType::Modpack => 20,
        _ => 30,
    }
}

#[derive(Deserialize)]
struct ModrinthSearchResult {
    hits: Vec<ModrinthProjectHit>,
}

#[derive(Deserialize)]
struct ModrinthProjectHit {
    project_id: String,
    slug: String,
    title: String,
    author: String,
    #[serde(default)]
    description: String,
    icon_url: Option<String>,
    downloads: u64,
    #[serde(default)]
    follows: u64,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Deserialize)]
struct ModrinthVersion {
    id: String,
    name: String,
    version_number: String,
    game_versions: Vec<String>,
    loaders: Vec<String>,
    version_type: String,
    date_published: String,
    files: Vec<ModrinthFile>,
}

#[derive(Deserialize)]
struct ModrinthFile {
    url: String,
    filename: String,
    primary: bool,
}

pub struct ModrinthClient {
    client: Client,
    base_url: String,
}

impl ModrinthClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, MODRINTH_API_URL)
    }

    /// Point the adapter at a different API root. Tests use this to target
    /// a local mock server.
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_versions(&self, project_id: &str) -> Result<Vec<ModrinthVersion>> {
        let url = format!("{}/project/{}/version", self.base_url, project_id);
        get_json(&self.client, &url)
            .await
            .with_context(|| format!("Failed to list Modrinth versions for {}", project_id))
    }
}

fn release_channel(version_type: &str) -> ReleaseChannel {
    match version_type {
        "beta" => ReleaseChannel::Beta,
        "alpha" => ReleaseChannel::Alpha,
        _ => ReleaseChannel::Release,
    }
}

fn to_version_entry(v: ModrinthVersion) -> VersionEntry {
    VersionEntry {
        channel: release_channel(&v.version_type),
        id: v.id,
        name: v.name,
        version_number: v.version_number,
        mc_versions: v.game_versions,
        loaders: v.loaders,
        published: v.date_published,
        files: v
            .files
            .into_iter()
            .map(|f| VersionFile {
                url: f.url,
                filename: f.filename,
                primary: f.primary,
            })
            .collect(),
    }
}

#[async_trait]
impl PlatformClient for ModrinthClient {
    fn platform(&self) -> Platform {
        Platform::Modrinth
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let facets = format!(
            "[[\"project_type:{}\"]]",
            query.content_type.modrinth_project_type()
        );
        let url = format!(
            "{}/search?query={}&facets={}&index={}&limit={}&offset={}",
            self.base_url,
            urlencoding::encode(&query.text),
            urlencoding::encode(&facets),
            query.sort.modrinth_index(),
            page_limit(query.content_type),
            query.offset
        );

        let result: ModrinthSearchResult = get_json(&self.client, &url)
            .await
            .context("Modrinth search failed")?;

        Ok(result
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.project_id,
                platform: Platform::Modrinth,
                title: hit.title,
                author: hit.author,
                description: hit.description,
                thumbnail: hit.icon_url,
                downloads: hit.downloads,
                follows: Some(hit.follows),
                categories: hit.categories,
                slug: Some(hit.slug),
                website_url: None,
            })
            .collect())
    }

    async fn list_versions(&self, project_id: &str) -> Result<Vec<VersionEntry>> {
        let versions = self.fetch_versions(project_id).await?;
        Ok(versions.into_iter().map(to_version_entry).collect())
    }

    async fn get_file(&self, project_id: &str, version_id: Option<&str>) -> Result<FileRef> {
        let versions = self.fetch_versions(project_id).await?;

        let selected = match version_id {
            Some(wanted) => versions.into_iter().find(|v| v.id == wanted).ok_or_else(|| {
                anyhow::anyhow!("Version {} not found for Modrinth project {}", wanted, project_id)
            })?,
            None => versions.into_iter().next().ok_or_else(|| {
                anyhow::anyhow!("Modrinth project {} has no versions", project_id)
            })?,
        };

        to_version_entry(selected).to_file_ref()
    }
}
