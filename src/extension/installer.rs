//! Extension installer.
//!
//! Handles staging, copying, configuration merge and service registration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use toml::Table;

use super::database::massage_databases;
use super::manifest::{InstallerManifest, MANIFEST_FILENAME, load_manifest};
use super::{ExtensionError, ExtensionManager, StagedExtension, classify_groups, destination_path, services};
use crate::config::{MAJOR_COMMENT_BLOCK, RootKind, prepend_path};

/// Outcome of an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Name of the installed extension.
    pub name: String,
    /// Number of files copied into the install roots.
    pub files_copied: usize,
    /// Whether the configuration was changed and saved.
    pub config_changed: bool,
    /// Backup of the previous configuration file, if one was written.
    pub backup: Option<PathBuf>,
}

impl ExtensionManager {
    /// Installs the extension from the archive or directory at `extension_path`.
    pub fn install_extension(&mut self, extension_path: &Path) -> Result<InstallReport, ExtensionError> {
        self.log(
            &format!("Request to install '{}'", extension_path.display()),
            0,
        );

        let staged = StagedExtension::stage(extension_path, &self.tmp_dir)?;
        let report = self.install_from_dir(staged.root())?;
        if let Err(e) = staged.cleanup() {
            tracing::warn!("Could not remove extraction directory: {}", e);
        }

        self.log(
            &format!("Finished installing extension '{}'", extension_path.display()),
            0,
        );
        Ok(report)
    }

    /// Installs the extension whose components are in `extension_dir`.
    pub fn install_from_dir(&mut self, extension_dir: &Path) -> Result<InstallReport, ExtensionError> {
        self.log(
            &format!(
                "Request to install extension found in directory {}",
                extension_dir.display()
            ),
            2,
        );

        let manifest_path = extension_dir.join(MANIFEST_FILENAME);
        let manifest = load_manifest(&manifest_path)?;
        self.log(
            &format!("Found extension with name '{}'", manifest.name),
            2,
        );

        let files_copied = self.install_files(&manifest, extension_dir)?;

        let mut save_config = self.merge_config(&manifest);
        save_config |= self.register_services(&manifest);

        self.cache_manifest(&manifest, &manifest_path)?;

        let backup = if save_config {
            self.save_config()?
        } else {
            None
        };

        Ok(InstallReport {
            name: manifest.name,
            files_copied,
            config_changed: save_config,
            backup,
        })
    }

    /// Copies the manifest's files into their roots.
    ///
    /// Every group is classified before the first copy, so an unknown
    /// prefix leaves the roots untouched.
    fn install_files(&self, manifest: &InstallerManifest, extension_dir: &Path) -> Result<usize, ExtensionError> {
        self.log("Copying new files", 2);

        let groups = classify_groups(manifest)?;
        let mut copied = 0;

        for (group, kind) in groups {
            let root = self.roots.get(kind);
            for file in &group.files {
                let source_path = extension_dir.join(file);
                let destination = destination_path(root, file);
                self.log(
                    &format!(
                        "Copying from '{}' to '{}'",
                        source_path.display(),
                        destination.display()
                    ),
                    3,
                );

                if !self.dry_run {
                    if let Some(parent) = destination.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(&source_path, &destination)?;
                    copied += 1;
                }
            }
        }

        self.log(&format!("Copied {} files", copied), 2);
        Ok(copied)
    }

    /// Merges the manifest's configuration fragment. Returns true if the
    /// live configuration changed.
    fn merge_config(&mut self, manifest: &InstallerManifest) -> bool {
        let Some(fragment) = &manifest.config else {
            return false;
        };
        self.log("Adding sections to configuration file", 2);

        let fragment = self.prepare_fragment(fragment, &manifest.name);

        let new_top_level: Vec<String> = fragment
            .iter()
            .filter(|(key, value)| value.is_table() && !self.config.contains_key(key))
            .map(|(key, _)| key.clone())
            .collect();
        for section in &new_top_level {
            self.log(&format!("Adding section {}", section), 3);
        }

        let mut changed = false;
        if !self.dry_run {
            self.config.merge_fragment(&fragment);

            for section in &new_top_level {
                let mut block: Vec<String> = MAJOR_COMMENT_BLOCK
                    .iter()
                    .map(|line| (*line).to_string())
                    .collect();
                block.push(format!("# Options for extension '{}'", manifest.name));
                self.config.set_section_comment(section, &block);
            }
            changed = true;
        }

        self.log("Merged extension settings into configuration file", 3);
        changed
    }

    /// Adapts a copy of the fragment to this station's layout.
    ///
    /// Uninstall removes the prepared fragment too, so keys added here go
    /// away with the rest.
    pub(super) fn prepare_fragment(&self, fragment: &Table, name: &str) -> Table {
        let mut fragment = fragment.clone();

        if let Some(html_root) = self.config.get_str(&["StdReport", "HTML_ROOT"]) {
            prepend_path(&mut fragment, "HTML_ROOT", html_root);
        }

        if !massage_databases(&mut fragment, &self.config) {
            tracing::debug!("Database settings of '{}' merged as declared", name);
        }

        fragment
    }

    /// Adds the manifest's services to their pipeline groups. Returns true
    /// if the live configuration changed.
    fn register_services(&mut self, manifest: &InstallerManifest) -> bool {
        self.log("Adding services to service lists", 2);
        let mut changed = false;

        let groups: Vec<String> = self.service_groups.iter().map(str::to_string).collect();
        for group in &groups {
            let Some(declared) = manifest.services(group) else {
                continue;
            };
            let mut existing = services::configured_services(&self.config, group).unwrap_or_default();

            for service in declared {
                if existing.contains(&service) {
                    continue;
                }
                existing.push(service.clone());

                if !self.dry_run {
                    if services::add_service(&mut self.config, group, &service) {
                        changed = true;
                    } else {
                        tracing::warn!("[Engine.Services] is not a section; cannot register {}", service);
                    }
                }
                self.log(&format!("Added new service {} to {}", service, group), 3);
            }
        }

        changed
    }

    /// Keeps a copy of the manifest in the extension cache for uninstall.
    fn cache_manifest(&self, manifest: &InstallerManifest, manifest_path: &Path) -> Result<(), ExtensionError> {
        let installer_dir = self.roots.get(RootKind::Ext).join(&manifest.name);
        self.log(
            &format!("Saving installer file to {}", installer_dir.display()),
            0,
        );

        if !self.dry_run {
            fs::create_dir_all(&installer_dir)?;
            copy_with_metadata(manifest_path, &installer_dir.join(MANIFEST_FILENAME))?;
        }
        Ok(())
    }
}

/// Copies a file, keeping its permissions and modification time.
fn copy_with_metadata(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    let modified = fs::metadata(src)?.modified()?;
    fs::OpenOptions::new()
        .write(true)
        .open(dst)?
        .set_modified(modified)
}
