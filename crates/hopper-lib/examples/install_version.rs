use std::sync::Arc;

use anyhow::Result;

use hopper_lib::{Endpoints, JsonFileStore, Launcher, LoaderSpec, ProgressSender};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // Install a vanilla version into a throwaway directory. This talks to
    // the real Mojang services and may take a few minutes on a slow
    // network.
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(JsonFileStore::new(tmp.path().join("launcher.json")));
    let launcher = Launcher::with_store(store, Endpoints::default())?;

    let mut settings = launcher.settings().await?;
    settings.game_path = tmp.path().join("game");
    launcher.save_settings(&settings).await?;

    let version = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "1.20.1".to_string());
    println!(
        "Installing Minecraft {} into {}",
        version,
        tmp.path().display()
    );

    let (progress, mut events) = ProgressSender::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[{:>3}%] {:?}: {}", event.percent, event.stage, event.message);
        }
    });

    let profile = launcher
        .install_version(
            &LoaderSpec::vanilla(version.as_str()),
            &format!("Minecraft {}", version),
            &progress,
        )
        .await?;
    drop(progress);
    printer.await?;

    println!("Installed profile {:?}", profile.name);

    // An offline identity is enough to produce a launch document.
    launcher.login_offline("Player").await?;
    let config = launcher.build_launch_config(0, None).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
