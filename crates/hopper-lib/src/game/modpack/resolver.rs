//! Detects which manifest a pack archive carries and normalizes it.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use zip::ZipArchive;

use super::types::{CurseManifest, Manifest, ManifestFile, MrpackIndex, OverridesSpec};
use crate::game::installer::LoaderSpec;
use crate::net::truncate_snippet;

pub const MRPACK_INDEX_ENTRY: &str = "modrinth.index.json";
pub const CURSE_MANIFEST_ENTRY: &str = "manifest.json";

/// Read a pack archive and normalize whichever manifest it carries.
///
/// The index may sit at the archive root or below a top-level folder;
/// the detected prefix carries into the overrides spec so extraction
/// later targets the right entries. Blocking, call via `spawn_blocking`.
pub fn resolve_manifest(archive_path: &Path) -> Result<Manifest> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open pack archive {:?}", archive_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{:?} is not a readable zip archive", archive_path))?;
    log::debug!(
        "Scanning pack archive {:?} ({} entries)",
        archive_path,
        archive.len()
    );

    let entry_names: Vec<String> = archive.file_names().map(str::to_owned).collect();

    let mut mrpack: Option<(String, String)> = None;
    let mut curse: Option<(String, String)> = None;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_owned();

        if let Some(prefix) = match_index_entry(&name, MRPACK_INDEX_ENTRY) {
            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .with_context(|| format!("Failed to read {} from the archive", name))?;
            mrpack = Some((prefix, contents));
            // The mrpack index wins outright, no need to keep scanning.
            break;
        } else if let Some(prefix) = match_index_entry(&name, CURSE_MANIFEST_ENTRY) {
            if curse.is_none() {
                let mut contents = String::new();
                entry
                    .read_to_string(&mut contents)
                    .with_context(|| format!("Failed to read {} from the archive", name))?;
                curse = Some((prefix, contents));
            }
        }
    }

    if let Some((prefix, contents)) = mrpack {
        log::info!("Pack archive carries a Modrinth index (prefix {:?})", prefix);
        return normalize_mrpack(&prefix, &contents, &entry_names);
    }
    if let Some((prefix, contents)) = curse {
        log::info!(
            "Pack archive carries a CurseForge manifest (prefix {:?})",
            prefix
        );
        return normalize_curse(&prefix, &contents);
    }

    bail!(
        "{:?} contains neither {} nor {}",
        archive_path,
        MRPACK_INDEX_ENTRY,
        CURSE_MANIFEST_ENTRY
    )
}

/// `""` for a root entry, the folder prefix (with trailing slash) when the
/// entry sits below one, `None` when the name does not match at all.
fn match_index_entry(name: &str, target: &str) -> Option<String> {
    if name == target {
        return Some(String::new());
    }
    name.strip_suffix(target)
        .filter(|prefix| prefix.ends_with('/'))
        .map(str::to_owned)
}

fn normalize_mrpack(prefix: &str, contents: &str, entry_names: &[String]) -> Result<Manifest> {
    let index: MrpackIndex = serde_json::from_str(contents).with_context(|| {
        format!(
            "Unexpected {} shape: {}",
            MRPACK_INDEX_ENTRY,
            truncate_snippet(contents)
        )
    })?;

    let mc_version = index
        .dependencies
        .get("minecraft")
        .cloned()
        .with_context(|| format!("{} declares no minecraft version", MRPACK_INDEX_ENTRY))?;
    let loader = mrpack_loader(&index.dependencies, &mc_version);

    let files = index
        .files
        .into_iter()
        .map(|f| ManifestFile::Direct {
            path: f.path,
            urls: f.downloads,
            sha1: f.hashes.get("sha1").cloned(),
            sha512: f.hashes.get("sha512").cloned(),
        })
        .collect();

    let mut prefixes = vec![format!("{}overrides/", prefix)];
    let client_overrides = format!("{}client-overrides/", prefix);
    if entry_names.iter().any(|n| n.starts_with(&client_overrides)) {
        prefixes.push(client_overrides);
    }

    Ok(Manifest {
        name: index.name,
        loader,
        files,
        overrides: OverridesSpec::Direct(prefixes),
    })
}

fn mrpack_loader(dependencies: &HashMap<String, String>, mc_version: &str) -> LoaderSpec {
    if let Some(version) = dependencies.get("fabric-loader") {
        LoaderSpec::fabric(mc_version, version)
    } else if let Some(version) = dependencies.get("quilt-loader") {
        log::info!("Treating quilt loader {} as fabric", version);
        LoaderSpec::fabric(mc_version, version)
    } else if let Some(version) = dependencies.get("forge") {
        LoaderSpec::forge(mc_version, version)
    } else if let Some(version) = dependencies.get("neoforge") {
        log::info!("Treating neoforge {} as forge", version);
        LoaderSpec::forge(mc_version, version)
    } else {
        LoaderSpec::vanilla(mc_version)
    }
}

fn normalize_curse(prefix: &str, contents: &str) -> Result<Manifest> {
    let manifest: CurseManifest = serde_json::from_str(contents).with_context(|| {
        format!(
            "Unexpected {} shape: {}",
            CURSE_MANIFEST_ENTRY,
            truncate_snippet(contents)
        )
    })?;

    let mc_version = manifest.minecraft.version;
    let loader = manifest
        .minecraft
        .mod_loaders
        .iter()
        .find(|l| l.primary)
        .or_else(|| manifest.minecraft.mod_loaders.first())
        .map(|entry| curse_loader(&entry.id, &mc_version))
        .unwrap_or_else(|| LoaderSpec::vanilla(&mc_version));

    let files = manifest
        .files
        .into_iter()
        .map(|f| ManifestFile::Indirect {
            project_id: f.project_id,
            file_id: f.file_id,
            required: f.required,
        })
        .collect();

    let folder = manifest.overrides.trim_matches('/');
    let overrides = OverridesSpec::Staged(format!("{}{}/", prefix, folder));

    Ok(Manifest {
        name: manifest.name,
        loader,
        files,
        overrides,
    })
}

/// Loader ids look like `forge-47.2.0`: the kind by prefix, the version
/// after the last hyphen.
fn curse_loader(id: &str, mc_version: &str) -> LoaderSpec {
    let Some((_, version)) = id.rsplit_once('-') else {
        log::warn!("Unrecognized modloader id {:?}, treating the pack as vanilla", id);
        return LoaderSpec::vanilla(mc_version);
    };

    if id.starts_with("forge") {
        LoaderSpec::forge(mc_version, version)
    } else if id.starts_with("fabric") {
        LoaderSpec::fabric(mc_version, version)
    } else if id.starts_with("quilt") {
        log::info!("Treating quilt loader {} as fabric", version);
        LoaderSpec::fabric(mc_version, version)
    } else if id.starts_with("neoforge") {
        log::info!("Treating neoforge {} as forge", version);
        LoaderSpec::forge(mc_version, version)
    } else {
        log::warn!("Unrecognized modloader id {:?}, treating the pack as vanilla", id);
        LoaderSpec::vanilla(mc_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::LoaderKind;
    use std::io::Write;

    fn pack_archive(entries: &[(&str, &str)]) -> tempfile::NamedTempFile {
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
    fn mrpack_with_fabric_loader_normalizes() {
        let index = r#"{
            "name": "Fabulous",
            "dependencies": { "minecraft": "1.20.1", "fabric-loader": "0.15.0" },
            "files": [{
                "path": "mods/sodium.jar",
                "downloads": ["https://cdn.modrinth.com/sodium.jar"],
                "hashes": { "sha1": "abc", "sha512": "def" }
            }]
        }"#;
        let archive = pack_archive(&[("modrinth.index.json", index)]);

        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.name, "Fabulous");
        assert_eq!(manifest.loader.kind, LoaderKind::Fabric);
        assert_eq!(manifest.loader.mc_version, "1.20.1");
        assert_eq!(manifest.loader.loader_version.as_deref(), Some("0.15.0"));
        assert_eq!(
            manifest.files,
            vec![ManifestFile::Direct {
                path: "mods/sodium.jar".to_string(),
                urls: vec!["https://cdn.modrinth.com/sodium.jar".to_string()],
                sha1: Some("abc".to_string()),
                sha512: Some("def".to_string()),
            }]
        );
        assert_eq!(
            manifest.overrides,
            OverridesSpec::Direct(vec!["overrides/".to_string()])
        );
    }

    #[test]
    fn mrpack_without_loader_is_vanilla() {
        let index = r#"{
            "name": "Plain",
            "dependencies": { "minecraft": "1.20.1" },
            "files": []
        }"#;
        let archive = pack_archive(&[("modrinth.index.json", index)]);

        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.loader.kind, LoaderKind::Vanilla);
        assert!(manifest.loader.loader_version.is_none());
    }

    #[test]
    fn fabric_wins_over_forge_when_both_are_declared() {
        let index = r#"{
            "name": "Both",
            "dependencies": {
                "minecraft": "1.20.1",
                "forge": "47.2.0",
                "fabric-loader": "0.15.0"
            },
            "files": []
        }"#;
        let archive = pack_archive(&[("modrinth.index.json", index)]);

        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.loader.kind, LoaderKind::Fabric);
        assert_eq!(manifest.loader.loader_version.as_deref(), Some("0.15.0"));
    }

    #[test]
    fn quilt_and_neoforge_fold_into_fabric_and_forge() {
        let quilt = r#"{
            "name": "Quilted",
            "dependencies": { "minecraft": "1.20.1", "quilt-loader": "0.21.0" },
            "files": []
        }"#;
        let archive = pack_archive(&[("modrinth.index.json", quilt)]);
        assert_eq!(
            resolve_manifest(archive.path()).unwrap().loader.kind,
            LoaderKind::Fabric
        );

        let neo = r#"{
            "name": "Neo",
            "dependencies": { "minecraft": "1.20.1", "neoforge": "47.1.84" },
            "files": []
        }"#;
        let archive = pack_archive(&[("modrinth.index.json", neo)]);
        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.loader.kind, LoaderKind::Forge);
        assert_eq!(manifest.loader.loader_version.as_deref(), Some("47.1.84"));
    }

    #[test]
    fn curse_manifest_normalizes() {
        let body = r#"{
            "name": "RLCraft",
            "minecraft": {
                "version": "1.12.2",
                "modLoaders": [
                    { "id": "forge-14.23.5.2860", "primary": true },
                    { "id": "fabric-0.15.0", "primary": false }
                ]
            },
            "files": [
                { "projectID": 238222, "fileID": 4509312 },
                { "projectID": 245211, "fileID": 3913840, "required": false }
            ],
            "overrides": "overrides"
        }"#;
        let archive = pack_archive(&[("manifest.json", body)]);

        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.name, "RLCraft");
        assert_eq!(manifest.loader.kind, LoaderKind::Forge);
        assert_eq!(
            manifest.loader.loader_version.as_deref(),
            Some("14.23.5.2860")
        );
        assert_eq!(
            manifest.files,
            vec![
                ManifestFile::Indirect {
                    project_id: 238222,
                    file_id: 4509312,
                    required: true,
                },
                ManifestFile::Indirect {
                    project_id: 245211,
                    file_id: 3913840,
                    required: false,
                },
            ]
        );
        assert_eq!(
            manifest.overrides,
            OverridesSpec::Staged("overrides/".to_string())
        );
    }

    #[test]
    fn nested_pack_folders_are_honored() {
        let index = r#"{
            "name": "Nested",
            "dependencies": { "minecraft": "1.20.1", "fabric-loader": "0.15.0" },
            "files": []
        }"#;
        let archive = pack_archive(&[
            ("MyPack-1.0/modrinth.index.json", index),
            ("MyPack-1.0/overrides/config/a.toml", "x = 1"),
            ("MyPack-1.0/client-overrides/options.txt", "fov:70"),
        ]);

        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.name, "Nested");
        assert_eq!(
            manifest.overrides,
            OverridesSpec::Direct(vec![
                "MyPack-1.0/overrides/".to_string(),
                "MyPack-1.0/client-overrides/".to_string(),
            ])
        );
    }

    #[test]
    fn mrpack_takes_priority_over_a_curse_manifest() {
        let index = r#"{
            "name": "Primary",
            "dependencies": { "minecraft": "1.20.1" },
            "files": []
        }"#;
        let body = r#"{
            "name": "Secondary",
            "minecraft": { "version": "1.12.2", "modLoaders": [] },
            "files": []
        }"#;
        let archive = pack_archive(&[
            ("manifest.json", body),
            ("modrinth.index.json", index),
        ]);

        assert_eq!(resolve_manifest(archive.path()).unwrap().name, "Primary");
    }

    #[test]
    fn archives_without_a_manifest_are_rejected() {
        let archive = pack_archive(&[("readme.txt", "hello")]);
        let err = resolve_manifest(archive.path()).unwrap_err();
        assert!(err.to_string().contains("modrinth.index.json"));
    }

    #[test]
    fn malformed_manifests_surface_a_snippet() {
        let archive = pack_archive(&[("modrinth.index.json", "{\"name\": 42}")]);
        let err = resolve_manifest(archive.path()).unwrap_err();
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("Unexpected modrinth.index.json shape"));
        assert!(rendered.contains("42"));
    }

    #[test]
    fn missing_minecraft_version_is_an_error() {
        let archive = pack_archive(&[(
            "modrinth.index.json",
            r#"{ "name": "NoMc", "dependencies": {}, "files": [] }"#,
        )]);
        let err = resolve_manifest(archive.path()).unwrap_err();
        assert!(err.to_string().contains("minecraft version"));
    }

    #[test]
    fn unknown_loader_ids_fall_back_to_vanilla() {
        let body = r#"{
            "name": "Odd",
            "minecraft": {
                "version": "1.20.1",
                "modLoaders": [{ "id": "liteloader-1.20", "primary": true }]
            },
            "files": []
        }"#;
        let archive = pack_archive(&[("manifest.json", body)]);
        let manifest = resolve_manifest(archive.path()).unwrap();
        assert_eq!(manifest.loader.kind, LoaderKind::Vanilla);
    }
}
