//! Installer manifest parsing.
//!
//! Parses the `install.toml` file shipped at the top of every extension
//! bundle. The same file is cached on install and read back on uninstall.

use std::fs;
use std::path::{Component, Path};

use serde::Deserialize;
use toml::Table;

use super::ExtensionError;
use super::services::option_as_list;

/// File name of the manifest inside a bundle and inside the cache.
pub const MANIFEST_FILENAME: &str = "install.toml";

/// Extension manifest from `install.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstallerManifest {
    /// Extension name; also the name of its cache directory.
    pub name: String,
    /// Extension version.
    #[serde(default)]
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Author name.
    #[serde(default)]
    pub author: String,
    /// Author contact.
    #[serde(default)]
    pub author_email: String,
    /// Files to install, grouped by destination prefix.
    #[serde(default)]
    pub files: Vec<FileGroup>,
    /// Configuration fragment to merge into the station configuration.
    #[serde(default)]
    pub config: Option<Table>,
    /// Remaining keys, among them the pipeline-group service lists.
    #[serde(flatten)]
    pub extra: Table,
}

/// Files installed under one destination prefix.
///
/// Accepted in the manifest either as a table with `prefix` and `files`
/// keys or as a `["bin/user", ["bin/user/pmon.py"]]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "FileGroupRepr")]
pub struct FileGroup {
    /// Destination prefix such as `bin/user` or `skins/Pmon`.
    pub prefix: String,
    /// Paths relative to the bundle root. The first component is stripped
    /// when computing the destination.
    pub files: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileGroupRepr {
    Pair(String, Vec<String>),
    Table { prefix: String, files: Vec<String> },
}

impl From<FileGroupRepr> for FileGroup {
    fn from(repr: FileGroupRepr) -> Self {
        match repr {
            FileGroupRepr::Pair(prefix, files) | FileGroupRepr::Table { prefix, files } => {
                Self { prefix, files }
            }
        }
    }
}

impl InstallerManifest {
    /// Returns the services the extension declares for a pipeline group.
    #[must_use]
    pub fn services(&self, group: &str) -> Option<Vec<String>> {
        self.extra.get(group).and_then(option_as_list)
    }
}

/// Parses manifest text.
pub fn parse_manifest(content: &str) -> Result<InstallerManifest, ExtensionError> {
    let manifest: InstallerManifest = toml::from_str(content)
        .map_err(|e| ExtensionError::Manifest(format!("Failed to parse manifest: {}", e)))?;

    validate_manifest(&manifest)?;

    Ok(manifest)
}

/// Loads an extension manifest from a file.
pub fn load_manifest(path: &Path) -> Result<InstallerManifest, ExtensionError> {
    let content = fs::read_to_string(path).map_err(|e| {
        ExtensionError::Manifest(format!(
            "Failed to read manifest '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_manifest(&content)
}

/// Validates a manifest for required fields and safe paths.
fn validate_manifest(manifest: &InstallerManifest) -> Result<(), ExtensionError> {
    if !is_single_component(&manifest.name) {
        return Err(ExtensionError::Manifest(format!(
            "Invalid extension name '{}'",
            manifest.name
        )));
    }

    for group in &manifest.files {
        if !is_relative_inside(&group.prefix) {
            return Err(ExtensionError::Manifest(format!(
                "Invalid file group prefix '{}'",
                group.prefix
            )));
        }
        for file in &group.files {
            // A file needs the bundle directory plus at least a name.
            let depth = Path::new(file).components().count();
            if !is_relative_inside(file) || depth < 2 {
                return Err(ExtensionError::Manifest(format!(
                    "Invalid file path '{}' in group '{}'",
                    file, group.prefix
                )));
            }
        }
    }

    Ok(())
}

/// Returns true if `name` is one plain path component.
pub(crate) fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_relative_inside(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const PMON: &str = r#"
name = "pmon"
version = "0.4"
description = "Collect and display process memory usage."
author = "Matthew Wall"
process_services = "user.pmon.ProcessMonitor"

[[files]]
prefix = "bin/user"
files = ["bin/user/pmon.py"]

[[files]]
prefix = "skins/pmon"
files = ["skins/pmon/skin.conf", "skins/pmon/index.html.tmpl"]

[config.ProcessMonitor]
data_binding = "pmon_binding"

[config.DataBindings.pmon_binding]
database = "pmon_sqlite"
table_name = "archive"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = parse_manifest(PMON).unwrap();

        assert_eq!(manifest.name, "pmon");
        assert_eq!(manifest.version, "0.4");
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[1].prefix, "skins/pmon");
        assert_eq!(manifest.files[1].files.len(), 2);

        let config = manifest.config.as_ref().unwrap();
        assert!(config.contains_key("ProcessMonitor"));
        assert!(config.contains_key("DataBindings"));

        assert_eq!(
            manifest.services("process_services"),
            Some(vec!["user.pmon.ProcessMonitor".to_string()])
        );
        assert_eq!(manifest.services("report_services"), None);
    }

    #[test]
    fn test_parse_pair_file_groups() {
        let manifest = parse_manifest(
            r#"
name = "myext"
files = [["bin/user", ["bin/user/myext.py"]]]
data_services = ["user.myext.A", "user.myext.B"]
"#,
        )
        .unwrap();

        assert_eq!(
            manifest.files,
            vec![FileGroup {
                prefix: "bin/user".to_string(),
                files: vec!["bin/user/myext.py".to_string()],
            }]
        );
        assert_eq!(manifest.services("data_services").unwrap().len(), 2);
        assert!(manifest.config.is_none());
    }

    #[test]
    fn test_invalid_manifest_name() {
        assert!(parse_manifest("name = \"\"\n").is_err());
        assert!(parse_manifest("name = \"../escape\"\n").is_err());
        assert!(parse_manifest("name = \"a/b\"\n").is_err());
    }

    #[test]
    fn test_invalid_file_paths() {
        let escaping = r#"
name = "bad"
files = [["bin/user", ["bin/../../etc/passwd"]]]
"#;
        assert!(parse_manifest(escaping).is_err());

        let no_bundle_dir = r#"
name = "bad"
files = [["bin", ["myext.py"]]]
"#;
        assert!(parse_manifest(no_bundle_dir).is_err());
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let result = load_manifest(&dir.path().join(MANIFEST_FILENAME));
        assert!(matches!(result, Err(ExtensionError::Manifest(_))));
    }

    #[test]
    fn test_load_manifest_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILENAME);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(PMON.as_bytes()).unwrap();

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest, parse_manifest(PMON).unwrap());
    }
}
