//! Marketplace adapters for the two modpack providers.
//!
//! Each provider implements [`PlatformClient`] once; callers select an
//! adapter by [`Platform`] at the boundary instead of branching per
//! operation. Search degrades to an empty page on provider failure, while
//! the install pipeline treats the same failures as fatal.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod curseforge;
pub mod filter;
pub mod modrinth;


pub use curseforge::CurseForgeClient;
pub use modrinth::ModrinthClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Modrinth,
    CurseForge,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Modrinth => "modrinth",
            Platform::CurseForge => "curseforge",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "modrinth" => Ok(Platform::Modrinth),
            "curseforge" => Ok(Platform::CurseForge),
            other => anyhow::bail!("Unknown platform: {}", other),
        }
    }
}

/// What kind of content a search targets. CurseForge keys these by numeric
/// class id, Modrinth by a `project_type` facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Modpack,
    Mod,
    ResourcePack,
}

impl ContentType {
    pub fn curseforge_class_id(&self) -> u32 {
        match self {
            ContentType::Modpack => 4471,
            ContentType::Mod => 6,
            ContentType::ResourcePack => 12,
        }
    }

    pub fn modrinth_project_type(&self) -> &'static str {
        match self {
            ContentType::Modpack => "modpack",
            ContentType::Mod => "mod",
            ContentType::ResourcePack => "resourcepack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    Downloads,
    Newest,
}

impl SortOrder {
    /// Modrinth `index` query parameter.
    pub fn modrinth_index(&self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::Downloads => "downloads",
            SortOrder::Newest => "newest",
        }
    }

    /// CurseForge numeric `sortField` (2 popularity, 6 total downloads,
    /// 3 last updated).
    pub fn curseforge_sort_field(&self) -> u8 {
        match self {
            SortOrder::Relevance => 2,
            SortOrder::Downloads => 6,
            SortOrder::Newest => 3,
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "relevance" | "" => Ok(SortOrder::Relevance),
            "downloads" => Ok(SortOrder::Downloads),
            "newest" => Ok(SortOrder::Newest),
            other => anyhow::bail!("Unknown sort order: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub content_type: ContentType,
    pub sort: SortOrder,
    pub offset: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            text: text.into(),
            content_type,
            sort: SortOrder::default(),
            offset: 0,
        }
    }

    pub fn sorted_by(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// One search result, normalized across providers.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub platform: Platform,
    pub title: String,
    pub author: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub downloads: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follows: Option<u64>,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Release,
    Beta,
    Alpha,
}

/// One published version of a project.
#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    pub id: String,
    pub name: String,
    pub version_number: String,
    pub mc_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub channel: ReleaseChannel,
    pub published: String,
    pub files: Vec<VersionFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionFile {
    pub url: String,
    pub filename: String,
    pub primary: bool,
}

/// A concrete downloadable file resolved from `(project, version?)`,
/// consumed by the install pipeline.
#[derive(Debug, Clone)]
pub struct FileRef {
    pub version_id: String,
    pub version_name: String,
    pub filename: String,
    pub download_url: String,
}

/// A file record exists but the provider exposes no download URL for it.
/// CurseForge does this for projects whose authors opted out of API
/// distribution. Typed so install loops can skip such files while real
/// lookup failures stay fatal.
#[derive(Debug, thiserror::Error)]
#[error("{platform} file {file_id} ({filename}) has no download URL")]
pub struct NoDownloadUrl {
    pub platform: Platform,
    pub file_id: String,
    pub filename: String,
}

impl VersionEntry {
    /// The file to install from this version: the one flagged primary, or
    /// the first listed.
    pub fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
    }

    pub fn to_file_ref(&self) -> Result<FileRef> {
        let file = self
            .primary_file()
            .ok_or_else(|| anyhow::anyhow!("Version {} has no downloadable files", self.id))?;
        Ok(FileRef {
            version_id: self.id.clone(),
            version_name: self.name.clone(),
            filename: file.filename.clone(),
            download_url: file.url.clone(),
        })
    }
}

/// Uniform provider capability: search, list a project's versions, resolve
/// a `(project, version?)` pair to a downloadable file. `None` version means
/// latest.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>>;

    async fn list_versions(&self, project_id: &str) -> Result<Vec<VersionEntry>>;

    async fn get_file(&self, project_id: &str, version_id: Option<&str>) -> Result<FileRef>;
}
