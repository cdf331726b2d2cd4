//! The launcher session: one object owning the HTTP client, the store,
//! both marketplace adapters, and the install pipeline.
//!
//! Embedding layers construct a single [`Launcher`] at startup and call
//! its async operations directly. All state lives in the store document
//! or on disk under the game path; the session itself only holds handles,
//! so it is cheap to share behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tokio::sync::{Mutex, Semaphore};

use crate::config::Endpoints;
use crate::game::installer::{
    GameInstaller, InstallLayout, InstallStage, LoaderKind, LoaderSpec, ProgressSender, VersionKey,
};
use crate::game::launcher::{self, LaunchConfig};
use crate::game::metadata::types::{FabricLoaderVersion, ForgeVersion};
use crate::game::metadata::{loaders, VersionCatalog, VersionDescriptor};
use crate::game::modpack::ArchiveMaterializer;
use crate::marketplace::{
    filter, CurseForgeClient, FileRef, ModrinthClient, Platform, PlatformClient, SearchHit,
    SearchQuery, VersionEntry,
};
use crate::net;
use crate::store::{
    self, Account, JsonFileStore, KvStore, Profile, Settings, KEY_ACCOUNTS, KEY_SELECTED_ACCOUNT,
    KEY_SETTINGS,
};

/// Characters stripped from a profile name when deriving the legacy
/// instance folder under `modpacks/`.
static PROFILE_NAME_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^a-zA-Z0-9 -]").expect("profile name pattern compiles"));

/// Session-level failures that callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("An installation is already in progress")]
    InstallBusy,
}

pub struct Launcher {
    store: Arc<dyn KvStore>,
    http: Client,
    endpoints: Endpoints,
    modrinth: ModrinthClient,
    curseforge: CurseForgeClient,
    catalog: Arc<VersionCatalog>,
    materializer: ArchiveMaterializer,
    /// One install at a time; a second attempt fails fast instead of
    /// queueing behind the first.
    install_gate: Semaphore,
    /// Serializes read-modify-write cycles on the settings blob.
    settings_lock: Mutex<()>,
}

impl Launcher {
    /// Open a session over the JSON store document at `store_path`.
    pub fn open(store_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_store(Arc::new(JsonFileStore::new(store_path)), Endpoints::default())
    }

    /// Session over an arbitrary store, with every remote endpoint
    /// overridable. Tests point the endpoints at local mock servers.
    pub fn with_store(store: Arc<dyn KvStore>, endpoints: Endpoints) -> Result<Self> {
        let http = net::build_http_client()?;
        let modrinth = ModrinthClient::with_base_url(http.clone(), endpoints.modrinth.clone());
        let curseforge =
            CurseForgeClient::with_base_url(http.clone(), endpoints.curseforge.clone());
        let catalog = Arc::new(VersionCatalog::with_manifest_url(
            http.clone(),
            endpoints.version_manifest.clone(),
        ));
        let installer = Arc::new(
            GameInstaller::new(http.clone(), Arc::clone(&catalog))
                .with_endpoints(endpoints.clone()),
        );
        let materializer = ArchiveMaterializer::new(http.clone(), installer);
        Ok(Self {
            store,
            http,
            endpoints,
            modrinth,
            curseforge,
            catalog,
            materializer,
            install_gate: Semaphore::new(1),
            settings_lock: Mutex::new(()),
        })
    }

    /// Replace the shipped CurseForge client key with a caller-provided
    /// one.
    pub fn with_curseforge_key(mut self, api_key: impl Into<String>) -> Self {
        self.curseforge = self.curseforge.with_api_key(api_key);
        self
    }

    fn marketplace(&self, platform: Platform) -> &dyn PlatformClient {
        match platform {
            Platform::Modrinth => &self.modrinth,
            Platform::CurseForge => &self.curseforge,
        }
    }

    // ---- marketplace ----------------------------------------------------

    /// Search a provider. Provider failures degrade to an empty page with
    /// a warning so one broken service does not take the browse view down.
    pub async fn search(&self, platform: Platform, query: &SearchQuery) -> Vec<SearchHit> {
        match self.marketplace(platform).search(query).await {
            Ok(mut hits) => {
                filter::retain_clean_hits(query.content_type, &mut hits);
                hits
            }
            Err(err) => {
                log::warn!("{} search failed: {:#}", platform, err);
                Vec::new()
            }
        }
    }

    /// All release versions of a project, newest first.
    pub async fn list_versions(
        &self,
        platform: Platform,
        project_id: &str,
    ) -> Result<Vec<VersionEntry>> {
        self.marketplace(platform).list_versions(project_id).await
    }

    /// Resolve the downloadable file for a project version, or for the
    /// latest version when none is given.
    pub async fn get_file(
        &self,
        platform: Platform,
        project_id: &str,
        version_id: Option<&str>,
    ) -> Result<FileRef> {
        self.marketplace(platform).get_file(project_id, version_id).await
    }

    // ---- version metadata -----------------------------------------------

    /// The Mojang version catalog, releases and snapshots alike.
    pub async fn minecraft_versions(&self) -> Result<Vec<VersionDescriptor>> {
        self.catalog.all().await
    }

    pub async fn fabric_loader_versions(
        &self,
        mc_version: &str,
    ) -> Result<Vec<FabricLoaderVersion>> {
        loaders::fabric_loader_versions(&self.http, &self.endpoints.fabric_meta, mc_version).await
    }

    pub async fn forge_versions(&self, mc_version: &str) -> Result<Vec<ForgeVersion>> {
        loaders::forge_versions_for(&self.http, &self.endpoints.forge_promotions, mc_version).await
    }

    // ---- installation ---------------------------------------------------

    /// Install a marketplace pack and persist the resulting profile.
    ///
    /// Only one install may run at a time; a concurrent call fails with
    /// [`SessionError::InstallBusy`] without touching disk. `name` is the
    /// display name to fall back on when the pack manifest carries none.
    pub async fn install_modpack(
        &self,
        platform: Platform,
        project_id: &str,
        version_id: Option<&str>,
        name: Option<&str>,
        progress: &ProgressSender,
    ) -> Result<Profile> {
        let _permit = self
            .install_gate
            .try_acquire()
            .map_err(|_| SessionError::InstallBusy)?;

        let settings = self.settings().await?;
        let layout = InstallLayout::new(&settings.game_path);
        let fallback_name = name.unwrap_or("Modpack");

        let profile = self
            .materializer
            .install_pack(
                self.marketplace(platform),
                project_id,
                version_id,
                fallback_name,
                &layout,
                progress,
            )
            .await?;

        let stored = self.append_profile(profile).await?;
        progress.emit(InstallStage::Finalizing, 100, "Installation complete!");
        Ok(stored)
    }

    /// Install a bare game version (vanilla or with a loader) into the
    /// shared store and persist a profile pointing at it.
    pub async fn install_version(
        &self,
        spec: &LoaderSpec,
        name: &str,
        progress: &ProgressSender,
    ) -> Result<Profile> {
        let _permit = self
            .install_gate
            .try_acquire()
            .map_err(|_| SessionError::InstallBusy)?;

        let settings = self.settings().await?;
        let layout = InstallLayout::new(&settings.game_path);

        let profile = self
            .materializer
            .install_version(spec, name, &layout, progress)
            .await?;

        let stored = self.append_profile(profile).await?;
        progress.emit(InstallStage::Finalizing, 100, "Installation complete!");
        Ok(stored)
    }

    /// New profiles become the selected one.
    async fn append_profile(&self, profile: Profile) -> Result<Profile> {
        self.update_settings(move |settings| {
            settings.profiles.push(profile.clone());
            settings.last_profile_index = settings.profiles.len() - 1;
            Ok(profile)
        })
        .await
    }

    // ---- profiles -------------------------------------------------------

    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.settings().await?.profiles)
    }

    pub async fn update_profile(&self, index: usize, profile: Profile) -> Result<()> {
        self.update_settings(move |settings| {
            let slot = settings
                .profiles
                .get_mut(index)
                .with_context(|| format!("No profile at index {}", index))?;
            *slot = profile;
            Ok(())
        })
        .await
    }

    /// Remember which profile the play button targets.
    pub async fn select_profile(&self, index: usize) -> Result<()> {
        self.update_settings(move |settings| {
            settings.last_profile_index = index;
            Ok(())
        })
        .await
    }

    /// Delete a profile along with its installed version folder and its
    /// instance directory. Disk cleanup is best-effort; the profile entry
    /// is removed even when a directory cannot be deleted.
    pub async fn delete_profile(&self, index: usize) -> Result<Profile> {
        self.update_settings(move |settings| {
            if index >= settings.profiles.len() {
                bail!("No profile at index {}", index);
            }
            let profile = settings.profiles.remove(index);

            let layout = InstallLayout::new(&settings.game_path);
            remove_profile_dirs(&profile, &layout, &settings.game_path);

            if settings.last_profile_index >= index {
                settings.last_profile_index = settings.last_profile_index.saturating_sub(1);
            }
            if settings.profiles.is_empty() {
                settings.last_profile_index = 0;
            }
            Ok(profile)
        })
        .await
    }

    // ---- accounts -------------------------------------------------------

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(store::get_typed(self.store.as_ref(), KEY_ACCOUNTS)
            .await?
            .unwrap_or_default())
    }

    pub async fn selected_account_id(&self) -> Result<Option<String>> {
        store::get_typed(self.store.as_ref(), KEY_SELECTED_ACCOUNT).await
    }

    pub async fn selected_account(&self) -> Result<Option<Account>> {
        let Some(id) = self.selected_account_id().await? else {
            return Ok(None);
        };
        Ok(self
            .accounts()
            .await?
            .into_iter()
            .find(|account| account.id == id))
    }

    /// Create or refresh the offline account for `username` and select it.
    pub async fn login_offline(&self, username: &str) -> Result<Account> {
        self.upsert_account(Account::offline(username)).await
    }

    /// Store a Microsoft account record obtained from an external auth
    /// flow and select it.
    pub async fn add_microsoft_account(
        &self,
        uuid: impl Into<String>,
        name: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Result<Account> {
        self.upsert_account(Account::microsoft(uuid, name, access_token, refresh_token))
            .await
    }

    async fn upsert_account(&self, account: Account) -> Result<Account> {
        let mut accounts = self.accounts().await?;
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(slot) => *slot = account.clone(),
            None => accounts.push(account.clone()),
        }
        store::set_typed(self.store.as_ref(), KEY_ACCOUNTS, &accounts).await?;
        store::set_typed(self.store.as_ref(), KEY_SELECTED_ACCOUNT, &account.id).await?;
        Ok(account)
    }

    /// Remove an account. When it was the selected one, selection falls
    /// back to the first remaining account, or to none.
    pub async fn remove_account(&self, account_id: &str) -> Result<Vec<Account>> {
        let mut accounts = self.accounts().await?;
        accounts.retain(|account| account.id != account_id);
        store::set_typed(self.store.as_ref(), KEY_ACCOUNTS, &accounts).await?;

        if self.selected_account_id().await?.as_deref() == Some(account_id) {
            let next = accounts.first().map(|account| account.id.clone());
            store::set_typed(self.store.as_ref(), KEY_SELECTED_ACCOUNT, &next).await?;
        }
        Ok(accounts)
    }

    pub async fn select_account(&self, account_id: &str) -> Result<()> {
        store::set_typed(
            self.store.as_ref(),
            KEY_SELECTED_ACCOUNT,
            &account_id.to_string(),
        )
        .await
    }

    // ---- settings -------------------------------------------------------

    /// The settings blob, falling back to defaults when nothing is stored.
    pub async fn settings(&self) -> Result<Settings> {
        Ok(store::get_typed(self.store.as_ref(), KEY_SETTINGS)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let _guard = self.settings_lock.lock().await;
        store::set_typed(self.store.as_ref(), KEY_SETTINGS, settings).await
    }

    /// Read-modify-write on the settings blob under the session lock.
    /// Concurrent sessions on the same store still race whole-blob,
    /// last write wins.
    async fn update_settings<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Settings) -> Result<T>,
    {
        let _guard = self.settings_lock.lock().await;
        let mut settings: Settings = store::get_typed(self.store.as_ref(), KEY_SETTINGS)
            .await?
            .unwrap_or_default();
        let out = apply(&mut settings)?;
        store::set_typed(self.store.as_ref(), KEY_SETTINGS, &settings).await?;
        Ok(out)
    }

    // ---- launch ---------------------------------------------------------

    /// Build the launch document for the profile at `index` using the
    /// selected account. `server` quick-joins a `host[:port]` address.
    pub async fn build_launch_config(
        &self,
        index: usize,
        server: Option<&str>,
    ) -> Result<LaunchConfig> {
        let settings = self.settings().await?;
        let profile = settings
            .profiles
            .get(index)
            .with_context(|| format!("No profile at index {}", index))?;
        let account = self
            .selected_account()
            .await?
            .context("No account selected")?;
        let layout = InstallLayout::new(&settings.game_path);
        launcher::build_launch_config(profile, &account, &settings, &layout, server).await
    }
}

/// Best-effort removal of the version folder and instance directory a
/// profile owns. Version folders are shared-store keyed; the instance is
/// the profile's own `game_path`, or the legacy `modpacks/{clean name}`
/// folder when the profile predates per-instance paths.
fn remove_profile_dirs(profile: &Profile, layout: &InstallLayout, shared_root: &Path) {
    let version_key = match (profile.modloader, &profile.modloader_version) {
        (LoaderKind::Vanilla, _) => Some(VersionKey::from_raw(profile.version.as_str())),
        (kind, Some(loader_version)) => Some(
            LoaderSpec {
                kind,
                mc_version: profile.version.clone(),
                loader_version: Some(loader_version.clone()),
            }
            .version_key(),
        ),
        (_, None) => None,
    };
    if let Some(key) = version_key {
        remove_dir_logged(&layout.version_dir(&key));
    }

    match profile.game_path.as_deref() {
        Some(path) if !path.as_os_str().is_empty() && path != shared_root => {
            remove_dir_logged(path);
        }
        _ => {
            let clean = sanitize_profile_name(&profile.name);
            if !clean.is_empty() {
                remove_dir_logged(&layout.instances_dir().join(clean));
            }
        }
    }
}

fn remove_dir_logged(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_dir_all(dir) {
        log::warn!("Could not remove {:?}: {}", dir, err);
    }
}

fn sanitize_profile_name(name: &str) -> String {
    PROFILE_NAME_FILTER.replace_all(name, "").trim().to_string()
}
