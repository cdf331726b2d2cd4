//! Turns a marketplace pack reference into an installed instance.
//!
//! The sequence is strictly ordered: instance directory, pack archive,
//! manifest, game and loader, pack files, overrides, profile. Failures
//! surface immediately and leave whatever was already written on disk;
//! only a fully successful run produces a Profile.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use zip::ZipArchive;

use super::resolver::resolve_manifest;
use super::types::{Manifest, ManifestFile, OverridesSpec};
use crate::game::installer::{
    is_safe_relative_path, GameInstaller, InstallLayout, InstallStage, InstalledVersion,
    LoaderKind, LoaderSpec, ProgressSender,
};
use crate::marketplace::{NoDownloadUrl, PlatformClient};
use crate::net;
use crate::store::Profile;

pub struct ArchiveMaterializer {
    client: Client,
    installer: Arc<GameInstaller>,
}

impl ArchiveMaterializer {
    pub fn new(client: Client, installer: Arc<GameInstaller>) -> Self {
        Self { client, installer }
    }

    /// Install a marketplace pack into a fresh instance directory and
    /// return the profile describing it. The caller persists the profile,
    /// so an error at any step means no profile exists for the partial
    /// files left behind.
    pub async fn install_pack(
        &self,
        marketplace: &dyn PlatformClient,
        project_id: &str,
        version_id: Option<&str>,
        pack_name: &str,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<Profile> {
        progress.emit(InstallStage::Preparing, 10, "Preparing installation");

        let instance_dir = layout.instances_dir().join(format!(
            "{}_{}_{}",
            marketplace.platform().as_str(),
            project_id,
            Utc::now().timestamp_millis()
        ));
        tokio::fs::create_dir_all(&instance_dir)
            .await
            .with_context(|| format!("Failed to create instance directory {:?}", instance_dir))?;
        log::info!("Installing {} into {:?}", pack_name, instance_dir);

        let pack_file = marketplace
            .get_file(project_id, version_id)
            .await
            .with_context(|| format!("Failed to resolve the pack file for {}", project_id))?;
        progress.emit(
            InstallStage::DownloadingArchive,
            30,
            format!("Downloading {}", pack_file.filename),
        );

        let staging = tempfile::tempdir().context("Failed to create a staging directory")?;
        let archive_path = net::download_to_temp_file(&self.client, &pack_file.download_url, staging.path())
            .await
            .with_context(|| format!("Failed to download the pack archive {}", pack_file.filename))?;

        progress.message(InstallStage::ResolvingManifest, "Reading the pack manifest");
        let manifest = {
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || resolve_manifest(&archive_path))
                .await
                .context("Manifest resolution task failed")??
        };
        log::info!(
            "Resolved {}: {} files, {} on Minecraft {}",
            manifest.name,
            manifest.files.len(),
            manifest.loader.kind,
            manifest.mc_version()
        );

        let installed = self
            .ensure_versions(&manifest.loader, layout, progress)
            .await?;

        self.download_files(marketplace, &manifest, &instance_dir, progress)
            .await?;

        progress.message(InstallStage::ExtractingOverrides, "Applying pack overrides");
        apply_overrides(&archive_path, manifest.overrides.clone(), &instance_dir).await?;

        progress.emit(InstallStage::Finalizing, 95, "Creating profile");
        let display_name = if manifest.name.trim().is_empty() {
            pack_name.to_string()
        } else {
            manifest.name.clone()
        };
        Ok(Profile {
            name: display_name,
            version: manifest.loader.mc_version.clone(),
            version_type: "release".to_string(),
            modloader: installed.spec.kind,
            modloader_version: installed.spec.loader_version.clone(),
            game_path: Some(instance_dir),
            mod_count: manifest.files.len() as u32,
            created: Utc::now().timestamp_millis(),
            icon: None,
            min_memory: None,
            max_memory: None,
        })
    }

    /// Direct install without a pack: provision the shared store for the
    /// requested version and return a shared-store profile.
    pub async fn install_version(
        &self,
        spec: &LoaderSpec,
        name: &str,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<Profile> {
        progress.emit(InstallStage::Preparing, 10, "Preparing installation");

        let installed = self.ensure_versions(spec, layout, progress).await?;

        progress.emit(InstallStage::Finalizing, 95, "Creating profile");
        Ok(Profile {
            name: name.to_string(),
            version: spec.mc_version.clone(),
            version_type: "release".to_string(),
            modloader: installed.spec.kind,
            modloader_version: installed.spec.loader_version.clone(),
            game_path: None,
            mod_count: 0,
            created: Utc::now().timestamp_millis(),
            icon: None,
            min_memory: None,
            max_memory: None,
        })
    }

    /// The base game always goes in first; the loader descriptor on top
    /// when the spec asks for one.
    async fn ensure_versions(
        &self,
        spec: &LoaderSpec,
        layout: &InstallLayout,
        progress: &ProgressSender,
    ) -> Result<InstalledVersion> {
        let vanilla = LoaderSpec::vanilla(&spec.mc_version);
        progress.emit(
            InstallStage::InstallingLoader,
            50,
            format!("Installing Minecraft {}", spec.mc_version),
        );
        let base = self
            .installer
            .ensure_installed(&vanilla, layout, progress)
            .await?;

        if spec.kind == LoaderKind::Vanilla {
            return Ok(base);
        }

        progress.emit(
            InstallStage::InstallingLoader,
            60,
            format!(
                "Installing {} {}",
                spec.kind,
                spec.loader_version.as_deref().unwrap_or_default()
            ),
        );
        self.installer.ensure_installed(spec, layout, progress).await
    }

    async fn download_files(
        &self,
        marketplace: &dyn PlatformClient,
        manifest: &Manifest,
        instance_dir: &Path,
        progress: &ProgressSender,
    ) -> Result<()> {
        let total = manifest.files.len();
        if total == 0 {
            return Ok(());
        }
        progress.emit(
            InstallStage::DownloadingFiles,
            80,
            format!("Downloading {} files", total),
        );

        for (index, entry) in manifest.files.iter().enumerate() {
            match entry {
                ManifestFile::Direct {
                    path,
                    urls,
                    sha1,
                    sha512,
                } => {
                    self.download_direct(path, urls, sha1.as_deref(), sha512.as_deref(), instance_dir)
                        .await?;
                }
                ManifestFile::Indirect {
                    project_id,
                    file_id,
                    required,
                } => {
                    self.download_indirect(marketplace, *project_id, *file_id, *required, instance_dir)
                        .await?;
                }
            }

            let done = index + 1;
            progress.emit(
                InstallStage::DownloadingFiles,
                80 + ((done * 15) / total) as i32,
                format!("Downloading files ({}/{})", done, total),
            );
        }
        Ok(())
    }

    async fn download_direct(
        &self,
        path: &str,
        urls: &[String],
        sha1: Option<&str>,
        sha512: Option<&str>,
        instance_dir: &Path,
    ) -> Result<()> {
        let normalized = path.replace('\\', "/");
        if !is_safe_relative_path(&normalized) {
            bail!("Pack file path {:?} escapes the instance directory", path);
        }
        let url = urls
            .first()
            .with_context(|| format!("Pack file {} has no download URL", path))?;

        let dest = instance_dir.join(&normalized);
        net::download_to_path(&self.client, url, &dest, sha1)
            .await
            .with_context(|| format!("Failed to download {}", path))?;

        // Some indexes only carry the stronger hash.
        if sha1.is_none() {
            if let Some(expected) = sha512 {
                net::verify_file_sha512(&dest, expected).await?;
            }
        }
        Ok(())
    }

    async fn download_indirect(
        &self,
        marketplace: &dyn PlatformClient,
        project_id: u64,
        file_id: u64,
        required: bool,
        instance_dir: &Path,
    ) -> Result<()> {
        let file = match marketplace
            .get_file(&project_id.to_string(), Some(&file_id.to_string()))
            .await
        {
            Ok(file) => file,
            Err(err) => {
                if let Some(missing) = err.downcast_ref::<NoDownloadUrl>() {
                    if required {
                        log::warn!("Skipping {}: no download URL available", missing.filename);
                    } else {
                        log::debug!("Skipping optional file {}", missing.filename);
                    }
                    return Ok(());
                }
                return Err(err.context(format!(
                    "Failed to resolve pack file {}/{}",
                    project_id, file_id
                )));
            }
        };

        if !is_safe_relative_path(&file.filename) {
            bail!("Pack file name {:?} escapes the instance directory", file.filename);
        }
        let dest = instance_dir.join("mods").join(&file.filename);
        net::download_to_path(&self.client, &file.download_url, &dest, None)
            .await
            .with_context(|| format!("Failed to download {}", file.filename))
    }
}

async fn apply_overrides(
    archive_path: &Path,
    overrides: OverridesSpec,
    instance_dir: &Path,
) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let instance_dir = instance_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_overrides(&archive_path, &overrides, &instance_dir))
        .await
        .context("Overrides extraction task failed")?
}

fn extract_overrides(
    archive_path: &Path,
    overrides: &OverridesSpec,
    instance_dir: &Path,
) -> Result<()> {
    match overrides {
        OverridesSpec::Direct(prefixes) => {
            let mut archive = open_archive(archive_path)?;
            for prefix in prefixes {
                let count = extract_prefix(&mut archive, prefix, instance_dir)?;
                if count > 0 {
                    log::info!("Extracted {} override files from {}", count, prefix);
                }
            }
            Ok(())
        }
        OverridesSpec::Staged(prefix) => {
            let staging =
                tempfile::tempdir().context("Failed to create an overrides staging directory")?;
            let mut archive = open_archive(archive_path)?;
            let count = extract_prefix(&mut archive, prefix, staging.path())?;
            if count > 0 {
                merge_tree(staging.path(), instance_dir)
                    .with_context(|| format!("Failed to merge overrides into {:?}", instance_dir))?;
                log::info!("Merged {} override files from {}", count, prefix);
            }
            Ok(())
        }
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file =
        File::open(path).with_context(|| format!("Failed to reopen pack archive {:?}", path))?;
    ZipArchive::new(file).with_context(|| format!("{:?} is not a readable zip archive", path))
}

fn extract_prefix(
    archive: &mut ZipArchive<File>,
    prefix: &str,
    destination: &Path,
) -> Result<usize> {
    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_owned();
        if !name.starts_with(prefix) || name == prefix {
            continue;
        }

        let relative = name[prefix.len()..].replace('\\', "/");
        if !is_safe_relative_path(&relative) {
            bail!("Override entry {:?} escapes the instance directory", name);
        }

        let target = destination.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create override file {:?}", target))?;
        std::io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }
    Ok(extracted)
}

fn merge_tree(source: &Path, destination: &Path) -> Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            merge_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {:?} into place", entry.path()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn overrides_archive(entries: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        for (name, contents) in entries {
            zip.start_file::<&str, ()>(name, zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        file
    }

    #[test]
    fn direct_overrides_land_on_the_instance_root() {
        let archive = overrides_archive(&[
            ("overrides/config/quark.toml", "tweaks = true"),
            ("overrides/options.txt", "fov:70"),
            ("client-overrides/shaders/pack.zip", "bytes"),
            ("unrelated.txt", "ignored"),
        ]);
        let instance = tempfile::tempdir().unwrap();

        extract_overrides(
            archive.path(),
            &OverridesSpec::Direct(vec![
                "overrides/".to_string(),
                "client-overrides/".to_string(),
            ]),
            instance.path(),
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(instance.path().join("config/quark.toml")).unwrap(),
            "tweaks = true"
        );
        assert!(instance.path().join("options.txt").is_file());
        assert!(instance.path().join("shaders/pack.zip").is_file());
        assert!(!instance.path().join("unrelated.txt").exists());
    }

    #[test]
    fn staged_overrides_merge_over_existing_files() {
        let archive = overrides_archive(&[
            ("overrides/config/jei.cfg", "updated"),
            ("overrides/mods/extra.jar", "jar"),
        ]);
        let instance = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(instance.path().join("config")).unwrap();
        std::fs::write(instance.path().join("config/jei.cfg"), "stale").unwrap();
        std::fs::write(instance.path().join("keep.txt"), "untouched").unwrap();

        extract_overrides(
            archive.path(),
            &OverridesSpec::Staged("overrides/".to_string()),
            instance.path(),
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(instance.path().join("config/jei.cfg")).unwrap(),
            "updated"
        );
        assert!(instance.path().join("mods/extra.jar").is_file());
        assert_eq!(
            std::fs::read_to_string(instance.path().join("keep.txt")).unwrap(),
            "untouched"
        );
    }

    #[test]
    fn escaping_override_entries_are_rejected() {
        let archive = overrides_archive(&[("overrides/../evil.txt", "nope")]);
        let instance = tempfile::tempdir().unwrap();

        let err = extract_overrides(
            archive.path(),
            &OverridesSpec::Direct(vec!["overrides/".to_string()]),
            instance.path(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("escapes"));
        assert!(!instance.path().join("../evil.txt").exists());
    }

    #[test]
    fn missing_override_folders_are_a_no_op() {
        let archive = overrides_archive(&[("modrinth.index.json", "{}")]);
        let instance = tempfile::tempdir().unwrap();

        extract_overrides(
            archive.path(),
            &OverridesSpec::Staged("overrides/".to_string()),
            instance.path(),
        )
        .unwrap();

        assert_eq!(std::fs::read_dir(instance.path()).unwrap().count(), 0);
    }
}
