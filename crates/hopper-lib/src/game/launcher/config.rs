//! Launch configuration assembly.
//!
//! Collects everything the external process runner needs into one
//! serializable document: credentials, version selection, memory bounds,
//! JVM arguments and staged natives.

use crate::game::installer::{InstallLayout, LoaderKind, LoaderSpec, OsType, VersionKey};
use crate::game::launcher::arguments;
use crate::game::launcher::java::find_java_executable;
use crate::game::launcher::natives::stage_natives;
use crate::game::metadata::VersionDetail;
use crate::store::{Account, AccountType, Profile, Settings};
use anyhow::{bail, Context, Result};
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// OptiFine version ids embed the release they run on, e.g.
/// `"1.20.1-OptiFine_HD_U_I6"`.
static RELEASE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.\d+(\.\d+)?)").expect("version pattern compiles"));

/// Stock Windows install path of the runtime 1.20.1 forge wants.
const PINNED_JAVA17: &str = r"C:\Program Files\Java\jdk-17\bin\javaw.exe";

/// Credentials block of a launch configuration. Field names follow the
/// wire shape process runners expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub access_token: String,
    pub client_token: String,
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSelector {
    pub number: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
}

/// Heap bounds, preformatted for `-Xms`/`-Xmx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBounds {
    pub min: String,
    pub max: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickPlay {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<String>,
}

impl LaunchOverrides {
    fn is_empty(&self) -> bool {
        self.game_directory.is_none() && self.natives.is_none() && self.asset_index.is_none()
    }
}

/// Everything the external process runner needs to spawn the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    pub authorization: Authorization,
    /// Shared game store the runner resolves assets and libraries from.
    pub root: PathBuf,
    pub version: VersionSelector,
    pub memory: MemoryBounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_play: Option<QuickPlay>,
    #[serde(default, skip_serializing_if = "LaunchOverrides::is_empty")]
    pub overrides: LaunchOverrides,
}

/// Deterministic identity for offline play: the lowercase hex MD5 of
/// `"OfflinePlayer:" + name`, the same derivation offline-mode servers
/// use.
pub fn offline_uuid(name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("OfflinePlayer:{}", name).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve a profile into the launch document handed to the process
/// runner.
///
/// Loader profiles must already be installed; a missing version
/// descriptor fails the build rather than producing a config that cannot
/// start.
pub async fn build_launch_config(
    profile: &Profile,
    account: &Account,
    settings: &Settings,
    layout: &InstallLayout,
    server: Option<&str>,
) -> Result<LaunchConfig> {
    let (mc_version, custom) = base_version(&profile.version);

    let authorization = match account.account_type {
        AccountType::Microsoft => Authorization {
            access_token: account.access_token.clone().with_context(|| {
                format!("Microsoft account {} has no access token, sign in again", account.name)
            })?,
            client_token: account.id.clone(),
            uuid: account.id.clone(),
            name: account.name.clone(),
        },
        AccountType::Offline => Authorization {
            access_token: "offline".to_string(),
            client_token: account.id.clone(),
            uuid: offline_uuid(&account.name),
            name: account.name.clone(),
        },
    };

    let mut version = VersionSelector {
        number: mc_version.clone(),
        version_type: profile.version_type.clone(),
        custom,
    };

    let memory = MemoryBounds {
        min: format!("{}M", profile.min_memory.unwrap_or(settings.min_memory)),
        max: format!("{}M", profile.max_memory.unwrap_or(settings.max_memory)),
    };

    let mut java_path = match &settings.java_path {
        Some(path) if path.is_file() => Some(path.clone()),
        _ => match find_java_executable() {
            Ok(found) => Some(found),
            Err(err) => {
                log::warn!("No Java runtime found, leaving the choice to the runner: {:#}", err);
                None
            }
        },
    };

    let mut overrides = LaunchOverrides::default();
    if !profile.uses_shared_store() {
        if let Some(game_path) = &profile.game_path {
            if game_path != &settings.game_path {
                overrides.game_directory = Some(game_path.clone());
            }
        }
    }

    let mut custom_args = arguments::split_user_args(&settings.java_args);

    let mut server_host = None;
    let mut server_port = None;
    let mut quick_play = None;
    if let Some(address) = server {
        let (host, port) = match address.split_once(':') {
            Some((host, port)) => (host.to_string(), port.parse().ok()),
            None => (address.to_string(), None),
        };
        server_host = Some(host);
        server_port = port;
        quick_play = Some(QuickPlay {
            kind: "multiplayer".to_string(),
            identifier: address.to_string(),
        });
    }

    if profile.modloader != LoaderKind::Vanilla {
        overrides.asset_index = Some(mc_version.clone());

        // Natives live under the vanilla version folder, where the
        // loaders expect to find them.
        let stage_layout = layout.clone();
        let stage_key = VersionKey::from_raw(mc_version.as_str());
        let stage_root = settings.game_path.clone();
        let staged = tokio::task::spawn_blocking(move || {
            stage_natives(&stage_layout, &stage_key, &stage_root, OsType::current())
        })
        .await
        .context("Natives staging task failed")?;

        match staged {
            Ok(dir) => overrides.natives = Some(dir),
            Err(err) => {
                log::warn!("Natives staging failed: {:#}", err);
                let fallback = layout.game_path.join("bin").join("natives");
                if fallback.is_dir() {
                    overrides.natives = Some(fallback);
                }
            }
        }

        let loader_version = profile.modloader_version.clone().with_context(|| {
            format!(
                "Profile {:?} declares {} without a loader version",
                profile.name, profile.modloader
            )
        })?;
        let spec = LoaderSpec {
            kind: profile.modloader,
            mc_version: mc_version.clone(),
            loader_version: Some(loader_version),
        };
        let key = spec.version_key();
        if !layout.is_installed(&key) {
            bail!(
                "{} installation {} is corrupted or missing, reinstall the version",
                profile.modloader,
                key
            );
        }
        version.custom = Some(key.to_string());
    }

    arguments::augment_for_java17(&mut custom_args, &mc_version);

    // 1.20.1 forge ships JVM argument templates its module system cannot
    // start without; expand them here since generic runners do not.
    if mc_version == "1.20.1" && profile.modloader == LoaderKind::Forge {
        let pinned = Path::new(PINNED_JAVA17);
        if pinned.is_file() {
            java_path = Some(pinned.to_path_buf());
        }

        if let Some(custom) = version.custom.clone() {
            let forge_key = VersionKey::from_raw(custom);
            match load_descriptor(layout, &forge_key).await {
                Ok(detail) => {
                    custom_args.extend(arguments::forge_jvm_arguments(
                        &detail,
                        &forge_key,
                        &mc_version,
                        layout,
                        overrides.natives.as_deref(),
                    ));
                    if let Some(natives) = &overrides.natives {
                        arguments::pin_library_path(&mut custom_args, natives);
                    }
                }
                Err(err) => log::warn!("Could not expand forge JVM arguments: {:#}", err),
            }
        }
    }

    Ok(LaunchConfig {
        authorization,
        root: settings.game_path.clone(),
        version,
        memory,
        java_path,
        custom_args,
        server: server_host,
        port: server_port,
        quick_play,
        overrides,
    })
}

/// Split a profile version id into the release it runs on plus an
/// optional custom descriptor id.
fn base_version(version: &str) -> (String, Option<String>) {
    if version.contains("OptiFine") {
        if let Some(found) = RELEASE_PREFIX.find(version) {
            return (found.as_str().to_string(), Some(version.to_string()));
        }
    }
    (version.to_string(), None)
}

async fn load_descriptor(layout: &InstallLayout, key: &VersionKey) -> Result<VersionDetail> {
    let path = layout.descriptor_path(key);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Malformed version descriptor {}", path.display()))
}
