//! Pack manifest schemas and the normalized form the pipeline consumes.

use serde::Deserialize;
use std::collections::HashMap;

use crate::game::installer::LoaderSpec;

/// Modrinth pack index (`modrinth.index.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackIndex {
    pub name: String,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub files: Vec<MrpackFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackFile {
    pub path: String,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub hashes: HashMap<String, String>,
}

/// CurseForge pack manifest (`manifest.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseManifest {
    pub name: String,
    pub minecraft: CurseMinecraft,
    #[serde(default)]
    pub files: Vec<CurseFileEntry>,
    #[serde(default = "default_overrides")]
    pub overrides: String,
}

fn default_overrides() -> String {
    "overrides".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseMinecraft {
    pub version: String,
    #[serde(default)]
    pub mod_loaders: Vec<CurseModLoader>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseModLoader {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseFileEntry {
    #[serde(alias = "projectID")]
    pub project_id: u64,
    #[serde(alias = "fileID")]
    pub file_id: u64,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// One entry of a normalized manifest. Modrinth packs name their download
/// URLs directly; CurseForge packs only reference a project/file pair that
/// has to be resolved through the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestFile {
    Direct {
        path: String,
        urls: Vec<String>,
        sha1: Option<String>,
        sha512: Option<String>,
    },
    Indirect {
        project_id: u64,
        file_id: u64,
        required: bool,
    },
}

/// How pack overrides reach the instance directory.
#[derive(Debug, Clone, PartialEq)]
pub enum OverridesSpec {
    /// Zip prefixes extracted straight onto the instance root.
    Direct(Vec<String>),
    /// A single zip prefix extracted into a staging directory first, then
    /// merged file by file.
    Staged(String),
}

/// The schema-independent result of manifest resolution. Everything after
/// the resolver works exclusively on this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub loader: LoaderSpec,
    pub files: Vec<ManifestFile>,
    pub overrides: OverridesSpec,
}

impl Manifest {
    pub fn mc_version(&self) -> &str {
        &self.loader.mc_version
    }
}
