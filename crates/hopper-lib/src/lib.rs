//! Core pipeline for the Hopper launcher.
//!
//! Everything a desktop shell needs sits behind [`Launcher`]: the Mojang
//! version catalog, marketplace search across Modrinth and CurseForge,
//! modpack installation into per-instance directories, profile and
//! account persistence, and launch configuration handed to an external
//! [`GameRunner`].

pub mod config;
pub mod game;
pub mod marketplace;
pub mod net;
pub mod retry;
pub mod session;
pub mod store;

pub use config::Endpoints;
pub use game::installer::{
    InstallLayout, InstallStage, LoaderKind, LoaderSpec, ProgressEvent, ProgressSender, VersionKey,
};
pub use game::launcher::{GameHandle, GameRunner, LaunchConfig, LogCallback};
pub use game::metadata::VersionCatalog;
pub use marketplace::{ContentType, Platform, SearchQuery, SortOrder};
pub use session::{Launcher, SessionError};
pub use store::{Account, JsonFileStore, KvStore, Profile, Settings};
