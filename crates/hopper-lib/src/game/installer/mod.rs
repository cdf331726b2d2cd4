//! Installation of game versions and mod loaders into the shared store.

pub mod fabric;
pub mod forge;
pub mod progress;
pub mod types;
pub mod vanilla;

pub use fabric::FabricInstaller;
pub use forge::{ForgeInstaller, InstallerRunner, JavaInstallerRunner};
pub use progress::{InstallStage, ProgressEvent, ProgressSender};
pub use types::{is_safe_relative_path, InstallLayout, LoaderKind, LoaderSpec, OsType, VersionKey};
pub use vanilla::{HttpVanillaInstaller, VanillaInstaller};

use crate::config::Endpoints;
use crate::game::metadata::catalog::VersionCatalog;
use crate::game::metadata::loaders;
use crate::retry::RetryPolicy;
use anyhow::Result;
use futures::future::BoxFuture;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

/// One loader kind's installation logic. Implementations write into the
/// shared version store and return the key they installed under.
pub trait LoaderInstaller: Send + Sync {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderSpec,
        layout: &'a InstallLayout,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<VersionKey>>;
}

/// What `ensure_installed` produced. The spec can differ from the
/// requested one after a fabric recovery swapped the loader version.
#[derive(Debug, Clone)]
pub struct InstalledVersion {
    pub key: VersionKey,
    pub spec: LoaderSpec,
}

/// Dispatches install requests to the per-kind installers and owns the
/// idempotence check so installers never run over an existing install.
pub struct GameInstaller {
    client: Client,
    catalog: Arc<VersionCatalog>,
    endpoints: Endpoints,
    retry: RetryPolicy,
    vanilla: Option<Arc<dyn VanillaInstaller>>,
    forge_runner: Option<Arc<dyn InstallerRunner>>,
    forge_java: Option<PathBuf>,
}

impl GameInstaller {
    pub fn new(client: Client, catalog: Arc<VersionCatalog>) -> Self {
        Self {
            client,
            catalog,
            endpoints: Endpoints::default(),
            retry: RetryPolicy::default(),
            vanilla: None,
            forge_runner: None,
            forge_java: None,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_vanilla_installer(mut self, vanilla: Arc<dyn VanillaInstaller>) -> Self {
        self.vanilla = Some(vanilla);
        self
    }

    pub fn with_forge_runner(mut self, runner: Arc<dyn InstallerRunner>) -> Self {
        self.forge_runner = Some(runner);
        self
    }

    pub fn with_forge_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.forge_java = Some(java.into());
        self
    }

    fn installer_for(&self, kind: LoaderKind) -> Box<dyn LoaderInstaller> {
        match kind {
            LoaderKind::Vanilla => Box::new(VanillaLoader {
                catalog: Arc::clone(&self.catalog),
                capability: match &self.vanilla {
                    Some(vanilla) => Arc::clone(vanilla),
                    None => Arc::new(
                        HttpVanillaInstaller::new(self.client.clone())
                            .with_asset_objects_url(self.endpoints.asset_objects.clone()),
                    ),
                },
            }),
            LoaderKind::Fabric => Box::new(
                FabricInstaller::new(self.client.clone())
                    .with_meta_url(self.endpoints.fabric_meta.clone())
                    .with_retry(self.retry),
            ),
            LoaderKind::Forge => {
                let mut forge = ForgeInstaller::new(self.client.clone())
                    .with_maven_url(self.endpoints.forge_maven.clone())
                    .with_retry(self.retry);
                if let Some(runner) = &self.forge_runner {
                    forge = forge.with_runner(Arc::clone(runner));
                }
                if let Some(java) = &self.forge_java {
                    forge = forge.with_java(java.clone());
                }
                Box::new(forge)
            }
        }
    }

    /// Install `spec` unless the store already holds it. Vanilla counts as
    /// installed once its client jar exists; loaders once their descriptor
    /// does.
    pub async fn ensure_installed(
        &self,
        spec: &LoaderSpec,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<InstalledVersion> {
        let key = spec.version_key();
        let already = match spec.kind {
            LoaderKind::Vanilla => layout.client_jar_path(&key).is_file(),
            LoaderKind::Forge | LoaderKind::Fabric => layout.is_installed(&key),
        };
        if already {
            log::debug!("Version {} is already installed", key);
            return Ok(InstalledVersion {
                key,
                spec: spec.clone(),
            });
        }

        match spec.kind {
            LoaderKind::Fabric => self.install_fabric(spec, layout, progress).await,
            _ => {
                let key = self
                    .installer_for(spec.kind)
                    .install(spec, layout, progress)
                    .await?;
                Ok(InstalledVersion {
                    key,
                    spec: spec.clone(),
                })
            }
        }
    }

    /// Fabric install with the single recovery: when the requested loader
    /// version is rejected, retry once with the newest loader for that
    /// game version. The second failure is final.
    async fn install_fabric(
        &self,
        spec: &LoaderSpec,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<InstalledVersion> {
        let installer = self.installer_for(LoaderKind::Fabric);
        let first_failure = match installer.install(spec, layout, progress).await {
            Ok(key) => {
                return Ok(InstalledVersion {
                    key,
                    spec: spec.clone(),
                })
            }
            Err(err) => err,
        };

        let requested = spec.loader_version.as_deref().unwrap_or_default().to_string();
        log::warn!("Fabric {} install failed: {:#}", requested, first_failure);
        progress.emit(
            InstallStage::InstallingLoader,
            65,
            "Finding a compatible fabric loader",
        );

        let latest = match loaders::latest_fabric_loader(
            &self.client,
            &self.endpoints.fabric_meta,
            &spec.mc_version,
        )
        .await
        {
            Ok(version) => version,
            Err(lookup_err) => {
                return Err(lookup_err.context(format!(
                    "Fabric {} install failed: {:#}",
                    requested, first_failure
                )))
            }
        };

        progress.emit(
            InstallStage::InstallingLoader,
            65,
            format!("Installing fabric {}", latest),
        );
        let recovery_spec = LoaderSpec::fabric(spec.mc_version.clone(), latest);
        let key = installer.install(&recovery_spec, layout, progress).await?;
        log::info!(
            "Recovered with fabric loader {}",
            recovery_spec.loader_version.as_deref().unwrap_or_default()
        );
        Ok(InstalledVersion {
            key,
            spec: recovery_spec,
        })
    }
}

struct VanillaLoader {
    catalog: Arc<VersionCatalog>,
    capability: Arc<dyn VanillaInstaller>,
}

impl LoaderInstaller for VanillaLoader {
    fn install<'a>(
        &'a self,
        spec: &'a LoaderSpec,
        layout: &'a InstallLayout,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<VersionKey>> {
        Box::pin(async move {
            let descriptor = self.catalog.resolve(&spec.mc_version).await?;
            self.capability.install(&descriptor, layout, progress).await?;
            Ok(spec.version_key())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::metadata::types::VersionDescriptor;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Counts invocations and writes the minimal on-disk result so the
    /// idempotence check trips on the next call.
    struct CountingVanilla {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VanillaInstaller for CountingVanilla {
        async fn install(
            &self,
            descriptor: &VersionDescriptor,
            layout: &InstallLayout,
            _progress: &ProgressSender,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = VersionKey::from_raw(&descriptor.id);
            std::fs::create_dir_all(layout.version_dir(&key))?;
            std::fs::write(layout.descriptor_path(&key), b"{}")?;
            std::fs::write(layout.client_jar_path(&key), b"jar")?;
            Ok(())
        }
    }

    async fn manifest_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "latest": { "release": "1.20.1", "snapshot": "23w31a" },
                "versions": [
                    { "id": "1.20.1", "type": "release", "url": "https://example.invalid/1.20.1.json",
                      "releaseTime": "2023-06-12T13:25:51+00:00", "sha1": "abc" }
                ]
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn second_vanilla_install_skips_the_capability() {
        let server = manifest_server().await;
        let catalog = Arc::new(VersionCatalog::with_manifest_url(
            Client::new(),
            format!("{}/manifest.json", server.uri()),
        ));
        let vanilla = Arc::new(CountingVanilla {
            calls: AtomicUsize::new(0),
        });

        let installer = GameInstaller::new(Client::new(), catalog)
            .with_vanilla_installer(vanilla.clone());
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let spec = LoaderSpec::vanilla("1.20.1");
        let progress = ProgressSender::silent();

        let first = installer
            .ensure_installed(&spec, &layout, &progress)
            .await
            .unwrap();
        assert_eq!(first.key.as_str(), "1.20.1");
        assert_eq!(vanilla.calls.load(Ordering::SeqCst), 1);

        let second = installer
            .ensure_installed(&spec, &layout, &progress)
            .await
            .unwrap();
        assert_eq!(second.key.as_str(), "1.20.1");
        assert_eq!(vanilla.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fabric_recovers_once_with_the_latest_loader() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loader/1.20.1/0.0.1/profile/json"))
            .respond_with(ResponseTemplate::new(400).set_body_string("no such version"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/loader/1.20.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "loader": { "version": "0.16.0", "stable": true } },
                { "loader": { "version": "0.15.11", "stable": true } }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/loader/1.20.1/0.16.0/profile/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "upstream", "inheritsFrom": "1.20.1", "libraries": []
            })))
            .mount(&server)
            .await;

        let catalog = Arc::new(VersionCatalog::new(Client::new()));
        let installer = GameInstaller::new(Client::new(), catalog)
            .with_endpoints(Endpoints {
                fabric_meta: format!("{}/loader", server.uri()),
                ..Endpoints::default()
            })
            .with_retry(RetryPolicy::new(1, Duration::from_millis(1)));

        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let spec = LoaderSpec::fabric("1.20.1", "0.0.1");

        let installed = installer
            .ensure_installed(&spec, &layout, &ProgressSender::silent())
            .await
            .unwrap();

        assert_eq!(installed.key.as_str(), "fabric-loader-0.16.0-1.20.1");
        assert_eq!(installed.spec.loader_version.as_deref(), Some("0.16.0"));
        assert!(layout.is_installed(&installed.key));
        // The originally requested pair never got a descriptor.
        assert!(!layout.is_installed(&spec.version_key()));
    }

    #[tokio::test]
    async fn fabric_recovery_failure_reports_both_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loader/1.20.1/0.0.1/profile/json"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad version"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/loader/1.20.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let catalog = Arc::new(VersionCatalog::new(Client::new()));
        let installer = GameInstaller::new(Client::new(), catalog)
            .with_endpoints(Endpoints {
                fabric_meta: format!("{}/loader", server.uri()),
                ..Endpoints::default()
            })
            .with_retry(RetryPolicy::new(1, Duration::from_millis(1)));

        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let spec = LoaderSpec::fabric("1.20.1", "0.0.1");

        let err = installer
            .ensure_installed(&spec, &layout, &ProgressSender::silent())
            .await
            .unwrap_err();
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("No fabric loader is available"));
        assert!(rendered.contains("0.0.1"));
    }

    #[tokio::test]
    async fn installed_loader_descriptor_short_circuits() {
        let catalog = Arc::new(VersionCatalog::new(Client::new()));
        let installer = GameInstaller::new(Client::new(), catalog);

        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let spec = LoaderSpec::forge("1.20.1", "47.2.0");
        let key = spec.version_key();
        std::fs::create_dir_all(layout.version_dir(&key)).unwrap();
        std::fs::write(layout.descriptor_path(&key), b"{}").unwrap();

        // No endpoints are reachable in this test; only the short-circuit
        // path can produce an Ok.
        let installed = installer
            .ensure_installed(&spec, &layout, &ProgressSender::silent())
            .await
            .unwrap();
        assert_eq!(installed.key, key);
    }
}
