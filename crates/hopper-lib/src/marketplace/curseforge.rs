use crate::marketplace::{
    FileRef, NoDownloadUrl, Platform, PlatformClient, ReleaseChannel, SearchHit, SearchQuery,
    VersionEntry, VersionFile,
};
use crate::config::CURSEFORGE_API_URL;
use crate::net::truncate_snippet;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Game id CurseForge assigns to Minecraft.
const GAME_ID_MINECRAFT: u32 = 432;

/// Public client key shipped with the launcher. Override per instance with
/// [`CurseForgeClient::with_api_key`].
const DEFAULT_API_KEY: &str = "$2a$10$bL4bIL5pUWqfcO7KQtnMReakwtfHbNKh6v1uTpKlzhwoueEJQnPnm";

const PAGE_SIZE: u32 = 20;

#[derive(Deserialize)]
struct CfSearchResponse {
    data: Vec<CfMod>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfMod {
    id: u64,
    name: String,
    #[serde(default)]
    summary: String,
    authors: Vec<CfAuthor>,
    logo: Option<CfAsset>,
    #[serde(default)]
    attachments: Vec<CfAsset>,
    download_count: f64,
    #[serde(default)]
    categories: Vec<CfCategory>,
    links: CfLinks,
}

#[derive(Deserialize)]
struct CfAuthor {
    name: String,
}

#[derive(Deserialize)]
struct CfAsset {
    url: String,
}

#[derive(Deserialize)]
struct CfCategory {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfLinks {
    website_url: Option<String>,
}

#[derive(Deserialize)]
struct CfFilesResponse {
    data: Vec<CfFile>,
}

#[derive(Deserialize)]
struct CfFileResponse {
    data: CfFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfFile {
    id: u64,
    display_name: String,
    file_name: String,
    game_versions: Vec<String>,
    release_type: u8,
    file_date: String,
    download_url: Option<String>,
}

pub struct CurseForgeClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CurseForgeClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, CURSEFORGE_API_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// All CurseForge endpoints require the key header; responses are
    /// wrapped in a `data` envelope.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        if !status.is_success() {
            anyhow::bail!("HTTP {} from {}: {}", status, url, truncate_snippet(&body));
        }

        serde_json::from_str(&body).with_context(|| {
            format!(
                "Unexpected response shape from {}: {}",
                url,
                truncate_snippet(&body)
            )
        })
    }

    async fn fetch_file(&self, project_id: &str, file_id: &str) -> Result<CfFile> {
        let url = format!("{}/mods/{}/files/{}", self.base_url, project_id, file_id);
        let response: CfFileResponse = self
            .get_json(&url)
            .await
            .with_context(|| format!("Failed to fetch CurseForge file {}/{}", project_id, file_id))?;
        Ok(response.data)
    }

    async fn fetch_files(&self, project_id: &str) -> Result<Vec<CfFile>> {
        let url = format!("{}/mods/{}/files", self.base_url, project_id);
        let response: CfFilesResponse = self
            .get_json(&url)
            .await
            .with_context(|| format!("Failed to list CurseForge files for {}", project_id))?;
        Ok(response.data)
    }
}

fn release_channel(release_type: u8) -> ReleaseChannel {
    match release_type {
        1 => ReleaseChannel::Release,
        2 => ReleaseChannel::Beta,
        _ => ReleaseChannel::Alpha,
    }
}

fn to_version_entry(file: CfFile) -> VersionEntry {
    let files = match &file.download_url {
        Some(url) => vec![VersionFile {
            url: url.clone(),
            filename: file.file_name.clone(),
            primary: true,
        }],
        None => Vec::new(),
    };

    VersionEntry {
        id: file.id.to_string(),
        name: file.display_name,
        version_number: file.file_name,
        mc_versions: file.game_versions,
        loaders: Vec::new(),
        channel: release_channel(file.release_type),
        published: file.file_date,
        files,
    }
}

#[async_trait]
impl PlatformClient for CurseForgeClient {
    fn platform(&self) -> Platform {
        Platform::CurseForge
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let url = format!(
            "{}/mods/search?gameId={}&classId={}&searchFilter={}&sortField={}&sortOrder=desc&pageSize={}&index={}",
            self.base_url,
            GAME_ID_MINECRAFT,
            query.content_type.curseforge_class_id(),
            urlencoding::encode(&query.text),
            query.sort.curseforge_sort_field(),
            PAGE_SIZE,
            query.offset
        );

        let result: CfSearchResponse = self
            .get_json(&url)
            .await
            .context("CurseForge search failed")?;

        Ok(result
            .data
            .into_iter()
            .map(|item| {
                let thumbnail = item
                    .logo
                    .map(|l| l.url)
                    .or_else(|| item.attachments.into_iter().next().map(|a| a.url));
                SearchHit {
                    id: item.id.to_string(),
                    platform: Platform::CurseForge,
                    title: item.name,
                    author: item
                        .authors
                        .first()
                        .map(|a| a.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    description: item.summary,
                    thumbnail,
                    downloads: item.download_count as u64,
                    follows: None,
                    categories: item.categories.into_iter().map(|c| c.name).collect(),
                    slug: None,
                    website_url: item.links.website_url,
                }
            })
            .collect())
    }

    async fn list_versions(&self, project_id: &str) -> Result<Vec<VersionEntry>> {
        let files = self.fetch_files(project_id).await?;
        Ok(files.into_iter().map(to_version_entry).collect())
    }

    async fn get_file(&self, project_id: &str, version_id: Option<&str>) -> Result<FileRef> {
        let file = match version_id {
            Some(file_id) => self.fetch_file(project_id, file_id).await?,
            None => {
                // Prefer the newest stable release, falling back to whatever
                // the API lists first (usually a beta of the latest version).
                let files = self.fetch_files(project_id).await?;
                let release = files.iter().position(|f| f.release_type == 1);
                let mut files = files;
                match release {
                    Some(idx) => files.swap_remove(idx),
                    None => {
                        if files.is_empty() {
                            anyhow::bail!("CurseForge project {} has no files", project_id);
                        }
                        files.swap_remove(0)
                    }
                }
            }
        };

        if file.download_url.is_none() {
            return Err(NoDownloadUrl {
                platform: Platform::CurseForge,
                file_id: file.id.to_string(),
                filename: file.file_name.clone(),
            }
            .into());
        }

        to_version_entry(file).to_file_ref()
    }
}
