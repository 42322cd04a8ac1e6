//! Extension removal.
//!
//! Replays the cached manifest in reverse. Individual deletion failures are
//! logged and counted, never raised, so one missing file does not stop the
//! sweep.

use std::fs;
use std::path::{Path, PathBuf};

use super::manifest::{InstallerManifest, MANIFEST_FILENAME, is_single_component, load_manifest};
use super::{ExtensionError, ExtensionManager, classify_groups, destination_path, services, strip_leading_dir};
use crate::config::RootKind;

/// Compiled siblings removed along with a Python file.
const BYTECODE_EXTENSIONS: &[&str] = &["pyc", "pyo"];

/// Outcome of an uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    /// Name of the removed extension.
    pub name: String,
    /// Number of files deleted, compiled siblings included.
    pub files_removed: usize,
    /// Whether the configuration was changed and saved.
    pub config_changed: bool,
    /// Backup of the previous configuration file, if one was written.
    pub backup: Option<PathBuf>,
}

impl ExtensionManager {
    /// Removes the extension called `extension_name`.
    pub fn uninstall_extension(&mut self, extension_name: &str) -> Result<UninstallReport, ExtensionError> {
        self.log(
            &format!("Request to remove extension '{}'", extension_name),
            0,
        );

        // The name becomes a directory under the cache; nothing else may be reached.
        if !is_single_component(extension_name) {
            return Err(ExtensionError::NotInstalled(extension_name.to_string()));
        }

        let installer_dir = self.roots.get(RootKind::Ext).join(extension_name);
        let manifest = load_manifest(&installer_dir.join(MANIFEST_FILENAME)).map_err(|e| {
            tracing::debug!("No usable cached manifest for '{}': {}", extension_name, e);
            ExtensionError::NotInstalled(extension_name.to_string())
        })?;

        let files_removed = self.uninstall_files(&manifest)?;

        let mut save_config = self.unregister_services(&manifest);
        save_config |= self.remove_config(&manifest);

        self.log(
            &format!("Deleting installer directory {}", installer_dir.display()),
            2,
        );
        if !self.dry_run {
            if let Err(e) = fs::remove_dir_all(&installer_dir) {
                self.log(
                    &format!(
                        "Delete failed on directory '{}': {}",
                        installer_dir.display(),
                        e
                    ),
                    2,
                );
            }
        }

        let backup = if save_config {
            self.save_config()?
        } else {
            None
        };

        self.log(
            &format!("Finished removing extension '{}'", extension_name),
            0,
        );
        Ok(UninstallReport {
            name: manifest.name,
            files_removed,
            config_changed: save_config,
            backup,
        })
    }

    /// Deletes the files the manifest installed.
    fn uninstall_files(&self, manifest: &InstallerManifest) -> Result<usize, ExtensionError> {
        self.log("Removing files.", 2);

        let groups = classify_groups(manifest)?;
        let mut removed = 0;

        for (group, kind) in groups {
            let root = self.roots.get(kind);
            let mut deleted = Vec::new();
            for file in &group.files {
                let destination = destination_path(root, file);
                removed += self.delete_file(&destination, true);

                if destination.extension().is_some_and(|ext| ext == "py") {
                    for ext in BYTECODE_EXTENSIONS {
                        let compiled = destination.with_extension(ext);
                        removed += self.delete_file(&compiled, false);
                        deleted.push(compiled);
                    }
                }
                deleted.push(destination);
            }

            // Only the extension's own skin directory, never the skin root.
            if kind == RootKind::Skin {
                if let Some(subdir) = strip_leading_dir(&group.prefix) {
                    self.prune_directory(&root.join(subdir), &deleted, true);
                }
            }
        }

        self.log(&format!("Removed {} files", removed), 2);
        Ok(removed)
    }

    /// Removes the manifest's services from their pipeline groups. Returns
    /// true if the live configuration changed.
    fn unregister_services(&mut self, manifest: &InstallerManifest) -> bool {
        let mut changed = false;

        let groups: Vec<String> = self.service_groups.iter().map(str::to_string).collect();
        for group in &groups {
            let Some(declared) = manifest.services(group) else {
                continue;
            };
            let Some(existing) = services::configured_services(&self.config, group) else {
                continue;
            };

            for service in existing.iter().filter(|s| declared.contains(s)) {
                self.log(&format!("Removed service {} from {}", service, group), 3);
            }

            if !self.dry_run && services::remove_services(&mut self.config, group, &declared) {
                changed = true;
            }
        }

        changed
    }

    /// Removes the keys and sections the manifest's fragment added. Returns
    /// true if the live configuration changed.
    fn remove_config(&mut self, manifest: &InstallerManifest) -> bool {
        let Some(fragment) = &manifest.config else {
            return false;
        };

        self.log("Removing extension settings from configuration file", 2);
        if self.dry_run {
            return false;
        }

        let fragment = self.prepare_fragment(fragment, &manifest.name);
        self.config.remove_fragment(&fragment);
        true
    }

    /// Deletes a file, swallowing any error.
    ///
    /// Returns 1 if a file was deleted, 0 otherwise (including dry runs).
    /// Errors are logged only when `report_errors` is set.
    pub fn delete_file(&self, path: &Path, report_errors: bool) -> usize {
        self.log(&format!("Deleting file {}", path.display()), 2);
        if self.dry_run {
            return 0;
        }

        match fs::remove_file(path) {
            Ok(()) => 1,
            Err(e) => {
                if report_errors {
                    self.log(&format!("Delete failed: {}", e), 4);
                }
                0
            }
        }
    }

    /// Deletes a directory if it is empty, swallowing any error.
    ///
    /// A non-empty directory is left alone and only logged.
    pub fn delete_directory(&self, directory: &Path, report_errors: bool) {
        self.prune_directory(directory, &[], report_errors);
    }

    /// Like [`Self::delete_directory`], counting the entries in `deleted` as
    /// already gone. A dry run has not removed them, but plans to.
    fn prune_directory(&self, directory: &Path, deleted: &[PathBuf], report_errors: bool) {
        // A real run trusts the disk; a file that failed to delete still counts.
        let deleted: &[PathBuf] = if self.dry_run { deleted } else { &[] };
        let is_empty = fs::read_dir(directory).map(|entries| {
            entries
                .filter_map(Result::ok)
                .all(|entry| deleted.contains(&entry.path()))
        });

        match is_empty {
            Ok(false) => {
                self.log(
                    &format!("Directory '{}' not empty", directory.display()),
                    2,
                );
            }
            Ok(true) => {
                self.log(&format!("Deleting directory {}", directory.display()), 2);
                if !self.dry_run {
                    if let Err(e) = fs::remove_dir_all(directory) {
                        if report_errors {
                            self.log(
                                &format!(
                                    "Delete failed on directory '{}': {}",
                                    directory.display(),
                                    e
                                ),
                                2,
                            );
                        }
                    }
                }
            }
            Err(e) => {
                if report_errors {
                    self.log(
                        &format!(
                            "Delete failed on directory '{}': {}",
                            directory.display(),
                            e
                        ),
                        2,
                    );
                }
            }
        }
    }
}
