//! Java runtime discovery.
//!
//! Installed runtimes are looked up in the well-known per-OS install
//! roots before falling back to whatever is on PATH. Directory names are
//! compared descending so a `jdk-21` wins over a `jdk-17` sitting next
//! to it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[cfg(target_os = "windows")]
const INSTALL_ROOTS: &[&str] = &[
    r"C:\Program Files\Java",
    r"C:\Program Files\Eclipse Adoptium",
    r"C:\Program Files\Eclipse Foundation",
    r"C:\Program Files\Temurin",
    r"C:\Program Files\AdoptOpenJDK",
    r"C:\Program Files (x86)\Java",
    r"C:\Program Files (x86)\Eclipse Adoptium",
];

#[cfg(target_os = "macos")]
const INSTALL_ROOTS: &[&str] = &["/Library/Java/JavaVirtualMachines", "/opt/homebrew/opt"];

#[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
const INSTALL_ROOTS: &[&str] = &["/usr/lib/jvm", "/usr/java", "/opt/java"];

fn java_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "java.exe"
    } else {
        "java"
    }
}

/// Probe the conventional executable locations under one JDK directory.
/// macOS bundles bury the home directory one level deeper.
fn java_in_dir(dir: &Path) -> Option<PathBuf> {
    let direct = dir.join("bin").join(java_binary_name());
    if direct.is_file() {
        return Some(direct);
    }
    let bundled = dir
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_binary_name());
    if bundled.is_file() {
        return Some(bundled);
    }
    None
}

fn scan_install_roots(roots: &[PathBuf]) -> Option<PathBuf> {
    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        dirs.reverse();

        for dir in dirs {
            if let Some(java) = java_in_dir(&dir) {
                log::debug!("Found Java at {}", java.display());
                return Some(java);
            }
        }
    }
    None
}

/// Locate a Java executable, newest install first, PATH as a last resort.
pub fn find_java_executable() -> Result<PathBuf> {
    let roots: Vec<PathBuf> = INSTALL_ROOTS.iter().map(PathBuf::from).collect();
    if let Some(found) = scan_install_roots(&roots) {
        return Ok(found);
    }
    which::which("java").context("No Java runtime found on this system")
}

pub fn is_java_installed() -> bool {
    find_java_executable().is_ok()
}

/// Run `java -version` and pull the major version out of its banner.
/// The banner goes to stderr on every JVM that matters here.
pub async fn verify_java(java: &Path) -> Result<u32> {
    let output = tokio::process::Command::new(java)
        .arg("-version")
        .output()
        .await
        .with_context(|| format!("Failed to run {}", java.display()))?;

    let banner = String::from_utf8_lossy(&output.stderr);
    parse_java_major(&banner).with_context(|| {
        format!(
            "Unrecognized java -version output: {}",
            crate::net::truncate_snippet(banner.trim())
        )
    })
}

/// `"21.0.1"` parses to 21; the legacy `"1.8.0_392"` scheme to 8.
fn parse_java_major(banner: &str) -> Option<u32> {
    let start = banner.find("version \"")? + "version \"".len();
    let quoted = banner[start..].split('"').next()?;
    let mut parts = quoted.split(['.', '_', '-', '+']);
    let first = parts.next()?;
    if first == "1" {
        parts.next()?.parse().ok()
    } else {
        first.parse().ok()
    }
}
