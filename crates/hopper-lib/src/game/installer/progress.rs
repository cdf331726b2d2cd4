//! Progress events emitted by the installation pipeline.
//!
//! Each stage reports `{stage, percent, message}` through an unbounded
//! channel. The sender clamps percentages so consumers always observe a
//! monotonically non-decreasing sequence within one installation.

use serde::Serialize;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Preparing,
    DownloadingArchive,
    ResolvingManifest,
    InstallingLoader,
    DownloadingFiles,
    ExtractingOverrides,
    Finalizing,
}

impl InstallStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStage::Preparing => "preparing",
            InstallStage::DownloadingArchive => "downloading_archive",
            InstallStage::ResolvingManifest => "resolving_manifest",
            InstallStage::InstallingLoader => "installing_loader",
            InstallStage::DownloadingFiles => "downloading_files",
            InstallStage::ExtractingOverrides => "extracting_overrides",
            InstallStage::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: InstallStage,
    pub percent: i32,
    pub message: String,
}

/// Cloneable sender half of the progress channel.
///
/// `silent()` produces a sender whose events go nowhere, for callers that
/// do not care about progress (mirrors a no-op reporter).
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    last_percent: Arc<AtomicI32>,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                last_percent: Arc::new(AtomicI32::new(-1)),
            },
            rx,
        )
    }

    pub fn silent() -> Self {
        Self {
            tx: None,
            last_percent: Arc::new(AtomicI32::new(-1)),
        }
    }

    /// Emit an event. The percentage is clamped to 0..=100 and never
    /// decreases below the highest value already emitted.
    pub fn emit(&self, stage: InstallStage, percent: i32, message: impl Into<String>) {
        let requested = percent.clamp(0, 100);
        let previous = self.last_percent.fetch_max(requested, Ordering::SeqCst);
        let effective = previous.max(requested);

        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                stage,
                percent: effective,
                message: message.into(),
            });
        }
    }

    /// Emit a message at the current percentage.
    pub fn message(&self, stage: InstallStage, message: impl Into<String>) {
        let current = self.current_percent();
        self.emit(stage, current, message);
    }

    pub fn current_percent(&self) -> i32 {
        self.last_percent.load(Ordering::SeqCst).max(0)
    }
}
