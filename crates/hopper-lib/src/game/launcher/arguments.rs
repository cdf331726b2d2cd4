//! JVM argument assembly for launch configurations.
//!
//! Covers the three argument sources a launch needs: the user's raw
//! argument string, the module shim recent releases require on Java 17+,
//! and the JVM argument templates forge descriptors carry.

use crate::game::installer::types::{InstallLayout, OsType, VersionKey};
use crate::game::metadata::types::VersionDetail;
use std::collections::HashMap;
use std::path::Path;

/// Module flags 1.18+ clients need when running on Java 17 or newer.
const JAVA17_MODULE_ARGS: &[&str] = &[
    "--add-modules",
    "jdk.dynalink",
    "--add-opens",
    "java.base/java.util.jar=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.lang=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.lang.invoke=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.math=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.util=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.io=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.nio=ALL-UNNAMED",
    "--add-opens",
    "java.base/java.text=ALL-UNNAMED",
    "--add-opens",
    "java.logging/java.util.logging=ALL-UNNAMED",
    "--add-opens",
    "java.desktop/sun.awt=ALL-UNNAMED",
    "--add-opens",
    "java.base/sun.security.util=ALL-UNNAMED",
    "--add-opens",
    "java.base/sun.util.logging=ALL-UNNAMED",
];

/// Split a user-supplied JVM argument string shell-style, so quoted
/// values keep their spaces. Input that shlex cannot parse falls back to
/// plain whitespace splitting instead of being dropped.
pub fn split_user_args(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match shlex::split(raw) {
        Some(args) => args,
        None => {
            log::warn!(
                "Could not parse JVM arguments {:?}, splitting on whitespace",
                raw
            );
            raw.split_whitespace().map(str::to_string).collect()
        }
    }
}

/// Minor component of a release id: `"1.20.1"` gives 20. Snapshot ids
/// have no such component and yield `None`.
pub(crate) fn minor_version(mc_version: &str) -> Option<u32> {
    mc_version.split('.').nth(1)?.parse().ok()
}

/// Append the Java 17 module shim for releases that need it (1.18 and
/// newer). Additive and idempotent: the list is left alone when any
/// `jdk.dynalink` flag is already present.
pub fn augment_for_java17(args: &mut Vec<String>, mc_version: &str) {
    if !minor_version(mc_version).is_some_and(|minor| minor >= 18) {
        return;
    }
    if args.iter().any(|arg| arg.contains("jdk.dynalink")) {
        return;
    }
    args.extend(JAVA17_MODULE_ARGS.iter().map(|arg| arg.to_string()));
}

/// Expand the JVM argument templates of a forge descriptor against the
/// local store layout. The `-DignoreList` entry additionally gets the
/// forge client jar appended so the module scanner skips it.
pub fn forge_jvm_arguments(
    detail: &VersionDetail,
    forge_key: &VersionKey,
    mc_version: &str,
    layout: &InstallLayout,
    natives_dir: Option<&Path>,
) -> Vec<String> {
    let Some(arguments) = &detail.arguments else {
        return Vec::new();
    };

    let mut variables = HashMap::new();
    variables.insert("library_directory", path_string(&layout.libraries_dir()));
    variables.insert(
        "classpath_separator",
        OsType::current().classpath_separator().to_string(),
    );
    variables.insert("version_name", mc_version.to_string());
    variables.insert(
        "natives_directory",
        natives_dir.map(path_string).unwrap_or_default(),
    );
    variables.insert("launcher_name", "hopper".to_string());
    variables.insert("launcher_version", env!("CARGO_PKG_VERSION").to_string());

    let mut out = Vec::new();
    for value in &arguments.jvm {
        // Forge descriptors only carry plain strings here; conditional
        // entries belong to the vanilla parent and are skipped.
        let Some(template) = value.as_str() else {
            continue;
        };
        let mut arg = substitute(template, &variables);
        if arg.starts_with("-DignoreList=") {
            arg.push_str(&format!(",{}.jar", forge_key));
        }
        out.push(arg);
    }
    out
}

/// Replace every `-Djava.library.path` flag with a single one pointing at
/// `natives_dir`. Forge descriptors and user args both like to set it.
pub fn pin_library_path(args: &mut Vec<String>, natives_dir: &Path) {
    args.retain(|arg| !arg.starts_with("-Djava.library.path"));
    args.push(format!("-Djava.library.path={}", path_string(natives_dir)));
}

fn substitute(template: &str, variables: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("${{{}}}", key), value);
    }
    result
}

/// Canonical display form of a path when it exists, verbatim otherwise.
/// dunce keeps Windows paths in their drive-letter shape.
pub(crate) fn path_string(path: &Path) -> String {
    dunce::canonicalize(path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}
