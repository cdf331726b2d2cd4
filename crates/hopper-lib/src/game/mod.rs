pub mod installer;
pub mod launcher;
pub mod metadata;
pub mod modpack;

pub use installer::{GameInstaller, InstallLayout, LoaderKind, LoaderSpec, VersionKey};
pub use launcher::{build_launch_config, GameHandle, GameRunner, LaunchConfig};
pub use modpack::ArchiveMaterializer;
