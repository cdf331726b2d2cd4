//! Launch preparation: Java discovery, natives staging and assembly of
//! the configuration document handed to the process runner.

pub mod arguments;
pub mod config;
pub mod java;
pub mod natives;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use arguments::{augment_for_java17, split_user_args};
pub use config::{
    build_launch_config, offline_uuid, Authorization, LaunchConfig, LaunchOverrides, MemoryBounds,
    QuickPlay, VersionSelector,
};
pub use java::{find_java_executable, is_java_installed, verify_java};
pub use natives::stage_natives;

/// Receives game output lines. The second argument is `"stdout"` or
/// `"stderr"`.
pub type LogCallback = Arc<dyn Fn(String, &'static str) + Send + Sync + 'static>;

/// Process-execution boundary. The pipeline only builds [`LaunchConfig`]
/// documents; spawning the JVM and owning its lifetime happens outside
/// this crate.
#[async_trait]
pub trait GameRunner: Send + Sync {
    /// Spawn the game and return once the process is running. Output
    /// lines stream through `logs` until the process exits.
    async fn launch(
        &self,
        config: LaunchConfig,
        logs: Option<LogCallback>,
    ) -> Result<Box<dyn GameHandle>>;
}

/// Handle to a running game process.
#[async_trait]
pub trait GameHandle: Send {
    /// Wait for the game to exit and return its exit code.
    async fn wait(&mut self) -> Result<i32>;

    /// Ask the process to terminate.
    async fn kill(&mut self) -> Result<()>;
}
