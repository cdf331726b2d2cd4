//! Wire models for the Mojang version manifest (v2), per-version metadata
//! JSON, and loader metadata endpoints.

use crate::game::installer::types::OsType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Release,
    Snapshot,
    OldBeta,
    OldAlpha,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::Release => "release",
            VersionType::Snapshot => "snapshot",
            VersionType::OldBeta => "old_beta",
            VersionType::OldAlpha => "old_alpha",
        }
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub latest: LatestVersions,
    pub versions: Vec<VersionDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

/// One entry of the vanilla catalog. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: VersionType,
    pub url: String,
    #[serde(rename = "releaseTime", default)]
    pub release_time: String,
    #[serde(default)]
    pub sha1: String,
}

/// Per-version metadata document (`versions/<id>/<id>.json`). Loader
/// descriptors written by fabric/forge installs parse into the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDetail {
    pub id: String,
    #[serde(default)]
    pub downloads: HashMap<String, DownloadInfo>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default)]
    pub java_version: Option<JavaVersionInfo>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    #[serde(default)]
    pub inherits_from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIndexRef {
    pub id: String,
    pub url: String,
    pub sha1: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

/// Mixed string/conditional argument lists introduced with 1.13 metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<serde_json::Value>,
    #[serde(default)]
    pub jvm: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, Artifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub action: String,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

impl Library {
    /// Evaluate the library's OS rules. An empty rule list allows
    /// everything; otherwise the last matching rule's action decides.
    pub fn applies_to(&self, os: OsType) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let mut allowed = false;
        for rule in &self.rules {
            let matches = match &rule.os {
                Some(os_rule) => os_rule
                    .name
                    .as_deref()
                    .map(|n| n == os.as_str())
                    .unwrap_or(true),
                None => true,
            };
            if matches {
                allowed = rule.action == "allow";
            }
        }
        allowed
    }

    /// The native classifier artifact for `os`, resolved through the
    /// `natives` map (with `${arch}` substituted) when present, else by
    /// probing the conventional `natives-<os>` classifier keys.
    pub fn native_artifact(&self, os: OsType) -> Option<&Artifact> {
        let classifiers = self.downloads.as_ref()?.classifiers.as_ref()?;

        if let Some(natives) = &self.natives {
            if let Some(template) = natives.get(os.as_str()) {
                let key = template.replace("${arch}", "64");
                if let Some(artifact) = classifiers.get(&key) {
                    return Some(artifact);
                }
            }
        }

        os.native_classifiers()
            .iter()
            .find_map(|key| classifiers.get(*key))
    }
}

/// Fabric meta `versions/loader/{mc}` entry; only the loader part matters.
#[derive(Debug, Clone, Deserialize)]
pub struct FabricLoaderEntry {
    pub loader: FabricLoaderInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FabricLoaderInfo {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
}

/// A fabric loader version usable with one Minecraft version.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FabricLoaderVersion {
    pub version: String,
    pub stable: bool,
}

/// The static forge promotions document: `promos` keyed
/// `"{mc}-recommended"` / `"{mc}-latest"`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgePromotions {
    #[serde(default)]
    pub promos: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ForgeVersion {
    pub version: String,
    pub channel: String,
}

impl ForgePromotions {
    /// Promoted forge versions for one Minecraft version, recommended
    /// entry first.
    pub fn versions_for(&self, mc_version: &str) -> Vec<ForgeVersion> {
        let mut out = Vec::new();
        for channel in ["recommended", "latest"] {
            if let Some(version) = self.promos.get(&format!("{}-{}", mc_version, channel)) {
                if out.iter().any(|v: &ForgeVersion| &v.version == version) {
                    continue;
                }
                out.push(ForgeVersion {
                    version: version.clone(),
                    channel: channel.to_string(),
                });
            }
        }
        out
    }
}
