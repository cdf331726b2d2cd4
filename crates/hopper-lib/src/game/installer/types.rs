use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Mod-loading runtime targeted by an installation.
///
/// Quilt and NeoForge are not variants: modpack manifests declaring them are
/// mapped onto `Fabric` and `Forge` by the manifest resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Vanilla,
    Forge,
    Fabric,
}

impl LoaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Vanilla => "vanilla",
            LoaderKind::Forge => "forge",
            LoaderKind::Fabric => "fabric",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoaderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vanilla" => Ok(LoaderKind::Vanilla),
            "forge" => Ok(LoaderKind::Forge),
            "fabric" => Ok(LoaderKind::Fabric),
            _ => Err(anyhow::anyhow!("Unknown loader kind: {}", s)),
        }
    }
}

/// A fully specified loader selection. Determines the on-disk VersionKey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSpec {
    pub kind: LoaderKind,
    pub mc_version: String,
    pub loader_version: Option<String>,
}

impl LoaderSpec {
    pub fn vanilla(mc_version: impl Into<String>) -> Self {
        Self {
            kind: LoaderKind::Vanilla,
            mc_version: mc_version.into(),
            loader_version: None,
        }
    }

    pub fn forge(mc_version: impl Into<String>, loader_version: impl Into<String>) -> Self {
        Self {
            kind: LoaderKind::Forge,
            mc_version: mc_version.into(),
            loader_version: Some(loader_version.into()),
        }
    }

    pub fn fabric(mc_version: impl Into<String>, loader_version: impl Into<String>) -> Self {
        Self {
            kind: LoaderKind::Fabric,
            mc_version: mc_version.into(),
            loader_version: Some(loader_version.into()),
        }
    }

    pub fn version_key(&self) -> VersionKey {
        VersionKey::from_spec(self)
    }
}

/// Canonical on-disk identifier for an installed game+loader combination.
///
/// The construction rules must match folders written by earlier releases,
/// so no other derivation is permitted anywhere in the crate:
/// vanilla `{mc}`, forge `{mc}-forge-{loader}`,
/// fabric `fabric-loader-{loader}-{mc}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionKey(String);

impl VersionKey {
    pub fn from_spec(spec: &LoaderSpec) -> Self {
        let loader = spec.loader_version.as_deref().unwrap_or_default();
        let key = match spec.kind {
            LoaderKind::Vanilla => spec.mc_version.clone(),
            LoaderKind::Forge => format!("{}-forge-{}", spec.mc_version, loader),
            LoaderKind::Fabric => format!("fabric-loader-{}-{}", loader, spec.mc_version),
        };
        Self(key)
    }

    /// Wrap an identifier that already is a canonical key (e.g. one read
    /// back from a profile or produced by an external installer).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filesystem layout of the shared game directory: version store,
/// libraries, assets and the instance directories of modpack installs.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    pub game_path: PathBuf,
}

impl InstallLayout {
    pub fn new(game_path: impl Into<PathBuf>) -> Self {
        Self {
            game_path: game_path.into(),
        }
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.game_path.join("versions")
    }

    pub fn version_dir(&self, key: &VersionKey) -> PathBuf {
        self.versions_dir().join(key.as_str())
    }

    /// `versions/{key}/{key}.json`, the file whose presence defines
    /// "installed" regardless of whether the folder itself exists.
    pub fn descriptor_path(&self, key: &VersionKey) -> PathBuf {
        self.version_dir(key).join(format!("{}.json", key))
    }

    pub fn client_jar_path(&self, key: &VersionKey) -> PathBuf {
        self.version_dir(key).join(format!("{}.jar", key))
    }

    pub fn natives_dir(&self, key: &VersionKey) -> PathBuf {
        self.version_dir(key).join("natives")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.game_path.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.game_path.join("assets")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.game_path.join("modpacks")
    }

    pub fn is_installed(&self, key: &VersionKey) -> bool {
        self.descriptor_path(key).is_file()
    }
}

/// Host operating system, for library rules and native classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    Linux,
    MacOS,
}

impl OsType {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsType::Windows
        } else if cfg!(target_os = "macos") {
            OsType::MacOS
        } else {
            OsType::Linux
        }
    }

    /// The `os.name` value used by Mojang library rules.
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "windows",
            OsType::Linux => "linux",
            OsType::MacOS => "osx",
        }
    }

    pub fn classpath_separator(&self) -> &'static str {
        match self {
            OsType::Windows => ";",
            _ => ":",
        }
    }

    /// Native-jar classifier names for this OS, historical spellings included.
    pub fn native_classifiers(&self) -> &'static [&'static str] {
        match self {
            OsType::Windows => &["natives-windows"],
            OsType::Linux => &["natives-linux"],
            OsType::MacOS => &["natives-osx", "natives-macos"],
        }
    }

    pub fn dynamic_library_extension(&self) -> &'static str {
        match self {
            OsType::Windows => "dll",
            OsType::Linux => "so",
            OsType::MacOS => "dylib",
        }
    }
}

/// True when `path` stays inside its parent when joined (no absolute
/// components, no `..`). Applied to every path read from a manifest or
/// archive before it touches the filesystem.
pub fn is_safe_relative_path(path: &str) -> bool {
    let p = Path::new(path);
    !p.is_absolute()
        && !p
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_key_construction_is_exact() {
        assert_eq!(LoaderSpec::vanilla("1.20.1").version_key().as_str(), "1.20.1");
        assert_eq!(
            LoaderSpec::forge("1.20.1", "47.2.0").version_key().as_str(),
            "1.20.1-forge-47.2.0"
        );
        assert_eq!(
            LoaderSpec::fabric("1.20.1", "0.15.0").version_key().as_str(),
            "fabric-loader-0.15.0-1.20.1"
        );
    }

    #[test]
    fn version_key_is_deterministic() {
        let spec = LoaderSpec::forge("1.19.2", "43.3.0");
        assert_eq!(spec.version_key(), spec.version_key());
    }

    #[test]
    fn version_keys_do_not_collide_within_a_kind() {
        let a = LoaderSpec::fabric("1.20.1", "0.15.0").version_key();
        let b = LoaderSpec::fabric("1.20.1", "0.15.1").version_key();
        let c = LoaderSpec::fabric("1.20.2", "0.15.0").version_key();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);

        let d = LoaderSpec::forge("1.20.1", "47.2.0").version_key();
        let e = LoaderSpec::forge("1.20.1", "47.2.1").version_key();
        assert_ne!(d, e);
    }

    #[test]
    fn layout_paths_follow_the_store_shape() {
        let layout = InstallLayout::new("/data/.minecraft");
        let key = VersionKey::from_raw("fabric-loader-0.15.0-1.20.1");

        assert_eq!(
            layout.descriptor_path(&key),
            PathBuf::from("/data/.minecraft/versions/fabric-loader-0.15.0-1.20.1/fabric-loader-0.15.0-1.20.1.json")
        );
        assert_eq!(
            layout.client_jar_path(&key),
            PathBuf::from("/data/.minecraft/versions/fabric-loader-0.15.0-1.20.1/fabric-loader-0.15.0-1.20.1.jar")
        );
        assert_eq!(layout.instances_dir(), PathBuf::from("/data/.minecraft/modpacks"));
    }

    #[test]
    fn loader_kind_round_trips_through_strings() {
        for kind in [LoaderKind::Vanilla, LoaderKind::Forge, LoaderKind::Fabric] {
            assert_eq!(kind.as_str().parse::<LoaderKind>().unwrap(), kind);
        }
        assert!("quilt".parse::<LoaderKind>().is_err());
    }

    #[test]
    fn unsafe_manifest_paths_are_rejected() {
        assert!(is_safe_relative_path("mods/sodium.jar"));
        assert!(!is_safe_relative_path("../escape.jar"));
        assert!(!is_safe_relative_path("/etc/passwd"));
    }
}
