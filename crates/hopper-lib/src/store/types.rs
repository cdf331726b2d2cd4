//! Persisted launcher state: settings, profiles, accounts.
//!
//! Wire names stay camelCase so blobs written by earlier builds keep
//! loading unchanged.

use crate::game::installer::LoaderKind;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MIN_MEMORY_MB: u64 = 2048;
pub const DEFAULT_MAX_MEMORY_MB: u64 = 4096;

static TOTAL_MEMORY_MB: Lazy<u64> = Lazy::new(|| {
    let system = sysinfo::System::new_with_specifics(
        sysinfo::RefreshKind::nothing().with_memory(sysinfo::MemoryRefreshKind::everything()),
    );
    system.total_memory() / (1024 * 1024)
});

/// Total physical memory in megabytes, probed once per process.
pub fn total_memory_mb() -> u64 {
    *TOTAL_MEMORY_MB
}

/// `.minecraft` under the platform config directory, the same location the
/// official launcher uses on Windows.
pub fn default_game_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".minecraft")
}

/// An installed game entry as shown in the profile list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    /// Minecraft version number, e.g. `1.20.1`.
    pub version: String,
    #[serde(default = "default_version_type")]
    pub version_type: String,
    pub modloader: LoaderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modloader_version: Option<String>,
    /// Private instance directory. `None` (or empty) means the profile
    /// lives in the shared store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_path: Option<PathBuf>,
    #[serde(default)]
    pub mod_count: u32,
    /// Creation time in milliseconds since the epoch.
    #[serde(default)]
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<u64>,
}

fn default_version_type() -> String {
    "release".to_string()
}

impl Profile {
    /// Whether the profile runs out of the shared store rather than a
    /// dedicated instance directory.
    pub fn uses_shared_store(&self) -> bool {
        self.game_path
            .as_ref()
            .map_or(true, |p| p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Microsoft,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Account {
    /// Offline accounts get a deterministic id so logging in with the same
    /// username twice updates one record instead of growing the list.
    pub fn offline(username: &str) -> Self {
        Self {
            id: format!("offline_{}", username.to_lowercase()),
            name: username.to_string(),
            account_type: AccountType::Offline,
            access_token: None,
            refresh_token: None,
            avatar: Some("https://mc-heads.net/avatar/MHF_Steve/64".to_string()),
        }
    }

    /// A Microsoft account record; `uuid` doubles as the account id and the
    /// in-game player UUID.
    pub fn microsoft(
        uuid: impl Into<String>,
        name: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        let id = uuid.into();
        let avatar = format!("https://mc-heads.net/avatar/{}/64", id);
        Self {
            id,
            name: name.into(),
            account_type: AccountType::Microsoft,
            access_token: Some(access_token.into()),
            refresh_token,
            avatar: Some(avatar),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub game_path: PathBuf,
    pub java_path: Option<PathBuf>,
    /// Extra JVM arguments as one shell-style string.
    pub java_args: String,
    pub min_memory: u64,
    pub max_memory: u64,
    pub profiles: Vec<Profile>,
    pub last_profile_index: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let total = total_memory_mb();
        let max_memory = if total > 0 {
            DEFAULT_MAX_MEMORY_MB.min(total)
        } else {
            DEFAULT_MAX_MEMORY_MB
        };
        Self {
            game_path: default_game_path(),
            java_path: None,
            java_args: String::new(),
            min_memory: DEFAULT_MIN_MEMORY_MB.min(max_memory),
            max_memory,
            profiles: Vec::new(),
            last_profile_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_ids_are_deterministic() {
        let first = Account::offline("Steve");
        let second = Account::offline("steve");
        assert_eq!(first.id, "offline_steve");
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Steve");
        assert_eq!(second.name, "steve");
    }

    #[test]
    fn microsoft_accounts_use_the_uuid_as_id() {
        let account = Account::microsoft("abc-123", "Player", "token", None);
        assert_eq!(account.id, "abc-123");
        assert_eq!(
            account.avatar.as_deref(),
            Some("https://mc-heads.net/avatar/abc-123/64")
        );
        assert_eq!(account.account_type, AccountType::Microsoft);
    }

    #[test]
    fn profiles_serialize_with_camel_case_keys() {
        let profile = Profile {
            name: "My Pack".to_string(),
            version: "1.20.1".to_string(),
            version_type: "release".to_string(),
            modloader: LoaderKind::Fabric,
            modloader_version: Some("0.15.0".to_string()),
            game_path: Some(PathBuf::from("/tmp/instance")),
            mod_count: 42,
            created: 1700000000000,
            icon: None,
            min_memory: None,
            max_memory: None,
        };

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["versionType"], "release");
        assert_eq!(value["modloader"], "fabric");
        assert_eq!(value["modloaderVersion"], "0.15.0");
        assert_eq!(value["modCount"], 42);
        assert!(value.get("icon").is_none());
    }

    #[test]
    fn partial_settings_blobs_pick_up_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"minMemory": 1024}"#).unwrap();
        assert_eq!(settings.min_memory, 1024);
        assert!(settings.java_args.is_empty());
        assert!(settings.profiles.is_empty());
        assert!(settings.game_path.ends_with(".minecraft"));
    }

    #[test]
    fn memory_defaults_stay_ordered() {
        let settings = Settings::default();
        assert!(settings.min_memory <= settings.max_memory);
        assert!(settings.max_memory <= DEFAULT_MAX_MEMORY_MB);
    }

    #[test]
    fn empty_game_path_counts_as_shared_store() {
        let mut profile = Profile {
            name: "Vanilla".to_string(),
            version: "1.20.1".to_string(),
            version_type: "release".to_string(),
            modloader: LoaderKind::Vanilla,
            modloader_version: None,
            game_path: None,
            mod_count: 0,
            created: 0,
            icon: None,
            min_memory: None,
            max_memory: None,
        };
        assert!(profile.uses_shared_store());

        profile.game_path = Some(PathBuf::new());
        assert!(profile.uses_shared_store());

        profile.game_path = Some(PathBuf::from("/tmp/instance"));
        assert!(!profile.uses_shared_store());
    }
}
