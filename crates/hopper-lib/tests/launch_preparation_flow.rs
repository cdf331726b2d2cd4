use std::io::Write;
use std::path::Path;

use hopper_lib::{InstallLayout, Launcher, LoaderKind, LoaderSpec, Profile, VersionKey};
use serde_json::json;

fn write_descriptor(layout: &InstallLayout, key: &VersionKey, value: serde_json::Value) {
    let path = layout.descriptor_path(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}

fn native_jar(path: &Path, entries: &[(&str, &[u8])]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file::<&str, ()>(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

#[tokio::test]
async fn a_fabric_profile_launch_stages_natives_and_user_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("game");
    let layout = InstallLayout::new(&root);

    // A vanilla descriptor listing one native library per platform, each
    // classifier backed by a real jar in the shared store.
    let vanilla_key = VersionKey::from_raw("1.20.1");
    write_descriptor(
        &layout,
        &vanilla_key,
        json!({
            "id": "1.20.1",
            "libraries": [{
                "name": "org.lwjgl:lwjgl:3.3.1",
                "natives": {
                    "linux": "natives-linux",
                    "windows": "natives-windows",
                    "osx": "natives-osx"
                },
                "extract": {"exclude": ["META-INF/"]},
                "downloads": {"classifiers": {
                    "natives-linux": {"path": "org/lwjgl/lwjgl-natives-linux.jar",
                                      "url": "https://unused/l.jar", "sha1": "a", "size": 1},
                    "natives-windows": {"path": "org/lwjgl/lwjgl-natives-windows.jar",
                                        "url": "https://unused/w.jar", "sha1": "b", "size": 1},
                    "natives-osx": {"path": "org/lwjgl/lwjgl-natives-osx.jar",
                                    "url": "https://unused/m.jar", "sha1": "c", "size": 1}
                }}
            }]
        }),
    );
    native_jar(
        &layout.libraries_dir().join("org/lwjgl/lwjgl-natives-linux.jar"),
        &[("liblwjgl.so", b"elf"), ("META-INF/MANIFEST.MF", b"m")],
    );
    native_jar(
        &layout.libraries_dir().join("org/lwjgl/lwjgl-natives-windows.jar"),
        &[("lwjgl.dll", b"pe"), ("META-INF/MANIFEST.MF", b"m")],
    );
    native_jar(
        &layout.libraries_dir().join("org/lwjgl/lwjgl-natives-osx.jar"),
        &[("liblwjgl.dylib", b"macho"), ("META-INF/MANIFEST.MF", b"m")],
    );

    // The installed fabric descriptor the profile points at.
    let fabric_key = LoaderSpec::fabric("1.20.1", "0.15.0").version_key();
    write_descriptor(
        &layout,
        &fabric_key,
        json!({"id": fabric_key.as_str(), "inheritsFrom": "1.20.1"}),
    );

    let launcher = Launcher::open(dir.path().join("launcher.json")).unwrap();
    let instance = dir.path().join("instances/skyfall");
    let mut settings = launcher.settings().await.unwrap();
    settings.game_path = root.clone();
    settings.java_args = "-Xss1M \"-Dgreeting=hello world\"".to_string();
    settings.profiles = vec![Profile {
        name: "Skyfall".to_string(),
        version: "1.20.1".to_string(),
        version_type: "release".to_string(),
        modloader: LoaderKind::Fabric,
        modloader_version: Some("0.15.0".to_string()),
        game_path: Some(instance.clone()),
        mod_count: 42,
        created: 0,
        icon: None,
        min_memory: None,
        max_memory: None,
    }];
    launcher.save_settings(&settings).await.unwrap();
    launcher.login_offline("Integration").await.unwrap();

    let config = launcher.build_launch_config(0, None).await.unwrap();

    assert_eq!(
        config.version.custom.as_deref(),
        Some("fabric-loader-0.15.0-1.20.1")
    );
    assert_eq!(config.version.number, "1.20.1");
    assert_eq!(config.root, root);
    assert_eq!(config.authorization.name, "Integration");
    assert_eq!(config.overrides.game_directory, Some(instance));
    assert_eq!(config.overrides.asset_index.as_deref(), Some("1.20.1"));

    // User arguments survive shell-style splitting, then the Java 17
    // module shim is appended for a 1.20 release.
    assert_eq!(config.custom_args[0], "-Xss1M");
    assert_eq!(config.custom_args[1], "-Dgreeting=hello world");
    assert!(config.custom_args.contains(&"--add-modules".to_string()));

    // Exactly the running platform's native library was unpacked under
    // the vanilla natives directory and mirrored next to the game root.
    let natives = config.overrides.natives.clone().expect("natives staged");
    assert!(natives.ends_with("versions/1.20.1/natives"));
    let extracted: Vec<_> = std::fs::read_dir(&natives)
        .unwrap()
        .flatten()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(extracted.len(), 1);
    assert!(!natives.join("META-INF").exists());
    assert!(root.join(&extracted[0]).is_file());
}

#[tokio::test]
async fn a_reopened_store_serves_the_same_session_state() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("launcher.json");

    {
        let launcher = Launcher::open(&store_path).unwrap();
        let mut settings = launcher.settings().await.unwrap();
        settings.game_path = dir.path().join("game");
        settings.profiles = vec![Profile {
            name: "Plain".to_string(),
            version: "1.16.5".to_string(),
            version_type: "release".to_string(),
            modloader: LoaderKind::Vanilla,
            modloader_version: None,
            game_path: None,
            mod_count: 0,
            created: 0,
            icon: None,
            min_memory: None,
            max_memory: None,
        }];
        settings.last_profile_index = 0;
        launcher.save_settings(&settings).await.unwrap();
        launcher.login_offline("Steve").await.unwrap();
    }

    let reopened = Launcher::open(&store_path).unwrap();
    let settings = reopened.settings().await.unwrap();
    assert_eq!(settings.game_path, dir.path().join("game"));
    assert_eq!(settings.profiles.len(), 1);
    assert_eq!(settings.profiles[0].name, "Plain");

    let account = reopened
        .selected_account()
        .await
        .unwrap()
        .expect("selection persisted");
    assert_eq!(account.id, "offline_steve");
    assert_eq!(reopened.accounts().await.unwrap().len(), 1);

    // A launch document builds from nothing but the persisted state.
    let config = reopened.build_launch_config(0, None).await.unwrap();
    assert_eq!(config.authorization.name, "Steve");
    assert_eq!(config.version.number, "1.16.5");
}
