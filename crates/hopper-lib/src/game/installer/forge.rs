//! Forge installation by running the official installer jar.

use crate::config;
use crate::game::installer::progress::{InstallStage, ProgressSender};
use crate::game::installer::types::{InstallLayout, LoaderSpec, VersionKey};
use crate::game::installer::LoaderInstaller;
use crate::game::launcher::java;
use crate::net;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs an installer jar. Split out so tests can fake the external
/// process while the rest of the flow stays real.
#[async_trait]
pub trait InstallerRunner: Send + Sync {
    async fn run(&self, java: &Path, jar: &Path, args: &[String], cwd: &Path) -> Result<()>;
}

/// Shells out to `java -jar`.
pub struct JavaInstallerRunner;

#[async_trait]
impl InstallerRunner for JavaInstallerRunner {
    async fn run(&self, java: &Path, jar: &Path, args: &[String], cwd: &Path) -> Result<()> {
        log::debug!(
            "Running {} -jar {} {}",
            java.display(),
            jar.display(),
            args.join(" ")
        );
        let output = tokio::process::Command::new(java)
            .arg("-jar")
            .arg(jar)
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", java.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Installer exited with {}: {}",
                output.status,
                net::truncate_snippet(stderr.trim())
            );
        }
        Ok(())
    }
}

pub struct ForgeInstaller {
    client: Client,
    maven_url: String,
    retry: RetryPolicy,
    runner: Arc<dyn InstallerRunner>,
    java: Option<PathBuf>,
}

impl ForgeInstaller {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            maven_url: config::FORGE_MAVEN_URL.to_string(),
            retry: RetryPolicy::default(),
            runner: Arc::new(JavaInstallerRunner),
            java: None,
        }
    }

    pub fn with_maven_url(mut self, url: impl Into<String>) -> Self {
        self.maven_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn InstallerRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Use a known Java executable instead of scanning for one.
    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = Some(java.into());
        self
    }

    fn installer_url(&self, mc_version: &str, loader_version: &str) -> String {
        format!(
            "{base}/{mc}-{loader}/forge-{mc}-{loader}-installer.jar",
            base = self.maven_url,
            mc = mc_version,
            loader = loader_version
        )
    }

    async fn run_installer(
        &self,
        spec: &LoaderSpec,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<VersionKey> {
        let loader_version = spec
            .loader_version
            .as_deref()
            .context("Forge installation requires a loader version")?;
        let key = spec.version_key();

        let java = match &self.java {
            Some(path) => path.clone(),
            None => java::find_java_executable()
                .context("Forge installers need a Java runtime to run")?,
        };

        log::info!(
            "Installing forge {} for minecraft {}",
            loader_version,
            spec.mc_version
        );
        progress.message(
            InstallStage::InstallingLoader,
            format!("Downloading forge installer {}", loader_version),
        );

        let staging = tempfile::tempdir().context("Failed to create a staging directory")?;
        let url = self.installer_url(&spec.mc_version, loader_version);
        let jar_path = staging.path().join(format!(
            "forge-{}-{}-installer.jar",
            spec.mc_version, loader_version
        ));
        self.retry
            .run("forge installer download", || {
                net::download_to_path(&self.client, &url, &jar_path, None)
            })
            .await?;

        tokio::fs::create_dir_all(&layout.game_path)
            .await
            .context("Failed to create the game directory")?;
        // The official installer refuses to touch a directory without a
        // launcher_profiles.json in it.
        let profiles_marker = layout.game_path.join("launcher_profiles.json");
        if !profiles_marker.is_file() {
            tokio::fs::write(&profiles_marker, b"{\"profiles\":{}}")
                .await
                .context("Failed to seed launcher_profiles.json")?;
        }

        progress.message(
            InstallStage::InstallingLoader,
            format!("Running forge installer {}", loader_version),
        );
        let args = vec![
            "--installClient".to_string(),
            layout.game_path.display().to_string(),
        ];
        self.runner
            .run(&java, &jar_path, &args, staging.path())
            .await
            .with_context(|| format!("Forge {} installer failed", loader_version))?;

        // Forge installers have been seen exiting zero without writing
        // anything. The descriptor decides, not the exit status.
        if layout.is_installed(&key) {
            log::info!("Forge descriptor present for {}", key);
            return Ok(key);
        }

        if let Some(actual) = find_written_version(layout, &spec.mc_version, loader_version) {
            log::warn!(
                "Forge installer wrote {} instead of the expected {}; accepting it",
                actual,
                key
            );
            return Ok(actual);
        }

        anyhow::bail!("Forge installation failed: version descriptor missing for {}", key)
    }
}

/// Look for a version folder the installer produced under a name of its
/// own choosing. Accepted when the folder name mentions both versions and
/// a descriptor file sits inside it.
fn find_written_version(
    layout: &InstallLayout,
    mc_version: &str,
    loader_version: &str,
) -> Option<VersionKey> {
    let entries = std::fs::read_dir(layout.versions_dir()).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(mc_version) || !name.contains(loader_version) {
            continue;
        }
        let candidate = VersionKey::from_raw(&name);
        if layout.is_installed(&candidate) {
            return Some(candidate);
        }
    }
    None
}

impl LoaderInstaller for ForgeInstaller {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderSpec,
        layout: &'a InstallLayout,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<VersionKey>> {
        Box::pin(self.run_installer(spec, layout, progress))
    }
}
