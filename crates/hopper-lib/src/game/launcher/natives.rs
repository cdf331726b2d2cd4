//! Native library staging for loader launches.
//!
//! Forge and fabric reuse the LWJGL natives of the vanilla version they
//! sit on, but expect them unpacked under `versions/{id}/natives`. The
//! staging pass unpacks them there on demand and mirrors the resulting
//! libraries next to the game root, where some loader versions look
//! first.

use crate::game::installer::types::{is_safe_relative_path, InstallLayout, OsType, VersionKey};
use crate::game::metadata::types::{Library, VersionDetail};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Unpack the platform natives listed by `key`'s descriptor into its
/// natives directory and mirror them next to `game_root`. Blocking, call
/// via `spawn_blocking`.
///
/// A missing descriptor or native jar is tolerated; a directory already
/// holding dynamic libraries short-circuits the extraction entirely.
pub fn stage_natives(
    layout: &InstallLayout,
    key: &VersionKey,
    game_root: &Path,
    os: OsType,
) -> Result<PathBuf> {
    let natives_dir = layout.natives_dir(key);
    std::fs::create_dir_all(&natives_dir)
        .with_context(|| format!("Failed to create {}", natives_dir.display()))?;

    let descriptor_path = layout.descriptor_path(key);
    if descriptor_path.is_file() && !has_dynamic_libraries(&natives_dir, os) {
        let raw = std::fs::read_to_string(&descriptor_path)
            .with_context(|| format!("Failed to read {}", descriptor_path.display()))?;
        let detail: VersionDetail = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed version descriptor {}", descriptor_path.display()))?;

        for library in &detail.libraries {
            if !library.applies_to(os) {
                continue;
            }
            let Some(artifact) = library.native_artifact(os) else {
                continue;
            };
            let jar = layout.libraries_dir().join(&artifact.path);
            if !jar.is_file() {
                log::debug!("Native jar {} is not on disk, skipping", jar.display());
                continue;
            }
            if let Err(err) = extract_native_jar(&jar, &natives_dir, library) {
                log::warn!("Failed to unpack natives from {}: {:#}", jar.display(), err);
            }
        }
    }

    mirror_next_to_root(&natives_dir, game_root, os);
    Ok(natives_dir)
}

fn has_dynamic_libraries(dir: &Path, os: OsType) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .path()
            .extension()
            .is_some_and(|ext| ext == os.dynamic_library_extension())
    })
}

/// Unpack one native jar, honoring its exclusion rules (typically
/// `META-INF/`).
fn extract_native_jar(jar: &Path, natives_dir: &Path, library: &Library) -> Result<()> {
    log::debug!("Unpacking natives from {}", jar.display());

    let file = std::fs::File::open(jar)?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to open native jar {}", jar.display()))?;

    let exclusions: &[String] = library
        .extract
        .as_ref()
        .and_then(|rules| rules.exclude.as_deref())
        .unwrap_or(&[]);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if entry.is_dir() || exclusions.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            continue;
        }
        if !is_safe_relative_path(&name) {
            bail!("Native jar entry {:?} escapes the natives directory", name);
        }

        let target = natives_dir.join(&name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Copy staged dynamic libraries next to the game root unless they are
/// already there. Best effort, failures only log.
fn mirror_next_to_root(natives_dir: &Path, game_root: &Path, os: OsType) {
    let Ok(entries) = std::fs::read_dir(natives_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let source = entry.path();
        let is_dynamic = source
            .extension()
            .is_some_and(|ext| ext == os.dynamic_library_extension());
        if !is_dynamic {
            continue;
        }
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = game_root.join(file_name);
        if target.exists() {
            continue;
        }
        if let Err(err) = std::fs::copy(&source, &target) {
            log::warn!(
                "Could not mirror {} next to the game root: {}",
                source.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::types::LoaderSpec;
    use serde_json::json;
    use std::io::Write;

    fn native_jar(path: &Path, entries: &[(&str, &[u8])]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, bytes) in entries {
            zip.start_file::<&str, ()>(*name, zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_descriptor(layout: &InstallLayout, key: &VersionKey, value: serde_json::Value) {
        let path = layout.descriptor_path(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn natives_unpack_and_mirror_to_the_game_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let key = LoaderSpec::vanilla("1.20.1").version_key();

        write_descriptor(
            &layout,
            &key,
            json!({
                "id": "1.20.1",
                "libraries": [{
                    "name": "org.lwjgl:lwjgl:3.3.1",
                    "natives": {"linux": "natives-linux"},
                    "extract": {"exclude": ["META-INF/"]},
                    "downloads": {"classifiers": {"natives-linux": {
                        "path": "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar",
                        "url": "https://x/n.jar", "sha1": "a", "size": 10
                    }}}
                }]
            }),
        );
        native_jar(
            &layout
                .libraries_dir()
                .join("org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"),
            &[
                ("liblwjgl.so", b"elf"),
                ("META-INF/MANIFEST.MF", b"manifest"),
            ],
        );

        let natives = stage_natives(&layout, &key, dir.path(), OsType::Linux).unwrap();

        assert!(natives.join("liblwjgl.so").is_file());
        assert!(!natives.join("META-INF").exists());
        assert!(dir.path().join("liblwjgl.so").is_file());
    }

    #[test]
    fn existing_libraries_short_circuit_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let key = LoaderSpec::vanilla("1.20.1").version_key();

        let natives = layout.natives_dir(&key);
        std::fs::create_dir_all(&natives).unwrap();
        std::fs::write(natives.join("libalready.so"), b"elf").unwrap();

        // The descriptor references a jar that does not exist. With a
        // populated natives directory it is never opened.
        write_descriptor(
            &layout,
            &key,
            json!({
                "id": "1.20.1",
                "libraries": [{
                    "name": "org.lwjgl:lwjgl:3.3.1",
                    "downloads": {"classifiers": {"natives-linux": {
                        "path": "missing.jar", "url": "https://x/n.jar", "sha1": "a", "size": 10
                    }}}
                }]
            }),
        );

        let staged = stage_natives(&layout, &key, dir.path(), OsType::Linux).unwrap();
        assert_eq!(staged, natives);
        assert!(dir.path().join("libalready.so").is_file());
    }

    #[test]
    fn a_missing_descriptor_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let key = LoaderSpec::vanilla("1.8.9").version_key();

        let natives = stage_natives(&layout, &key, dir.path(), OsType::Linux).unwrap();
        assert!(natives.is_dir());
    }

    #[test]
    fn escaping_jar_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("evil.jar");
        native_jar(&jar, &[("../escape.so", b"elf")]);

        let library: Library =
            serde_json::from_value(json!({"name": "com.example:evil:1.0"})).unwrap();
        let natives = dir.path().join("natives");
        std::fs::create_dir_all(&natives).unwrap();

        let err = extract_native_jar(&jar, &natives, &library).unwrap_err();
        assert!(err.to_string().contains("escapes"));
        assert!(!dir.path().join("escape.so").exists());
    }
}
