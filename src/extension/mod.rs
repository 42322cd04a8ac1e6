//! Extension management for a weewx-style station.
//!
//! An extension is a bundle (archive or directory) holding an
//! `install.toml` manifest and the files it lists. Installing copies the
//! files into the install roots, merges the manifest's configuration
//! fragment, registers its services, and caches the manifest under
//! `EXT_ROOT/<name>/`. Uninstalling replays the cached manifest in reverse.
//!
//! Every mutating step honours the manager's dry-run flag.

pub mod archive;
mod database;
pub mod installer;
pub mod manifest;
pub mod services;
pub mod uninstaller;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{ConfigError, ConfigTree, RootKind, Roots};
use crate::logging::{ConsoleLogger, Logger};

pub use archive::{StagedExtension, common_root, extract_archive};
pub use installer::InstallReport;
pub use manifest::{FileGroup, InstallerManifest, MANIFEST_FILENAME, load_manifest};
pub use services::{DEFAULT_SERVICE_GROUPS, ServiceGroups, option_as_list};
pub use uninstaller::UninstallReport;

/// Known file-group prefixes and the roots they install into.
pub const TARGET_DIRS: &[(&str, RootKind)] = &[("bin", RootKind::Bin), ("skins", RootKind::Skin)];

/// Errors that can occur in the extension system.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration could not be read, resolved or saved.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Manifest missing, unreadable or invalid.
    #[error("Manifest error: {0}")]
    Manifest(String),
    /// The extension path is neither a file nor a directory.
    #[error("Extension '{}' not found.", .0.display())]
    NotFound(PathBuf),
    /// The archive could not be extracted.
    #[error("Archive error: {0}")]
    Archive(String),
    /// The archive members do not share a top-level directory.
    #[error("No common path in archive '{}'. Unable to install.", .0.display())]
    NoCommonRoot(PathBuf),
    /// A file group names a prefix with no known destination.
    #[error("Unknown destination for file group '{0}'")]
    UnknownDestination(String),
    /// No cached manifest exists for the extension.
    #[error("Unable to find extension {0}")]
    NotInstalled(String),
}

impl ExtensionError {
    /// Returns true for errors that should end the process with a message.
    ///
    /// These mean the package or request is invalid as a whole, not that a
    /// single step failed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtensionError::UnknownDestination(_) | ExtensionError::NotInstalled(_)
        )
    }
}

/// Options for [`ExtensionManager::new`].
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Overrides the code root (`BIN_ROOT`).
    pub bin_root: Option<PathBuf>,
    /// Where archives are extracted. Defaults to the system temp dir.
    pub tmp_dir: Option<PathBuf>,
    /// Log every step without touching the filesystem or the configuration.
    pub dry_run: bool,
    /// Valid pipeline-group names.
    pub service_groups: ServiceGroups,
}

/// Installs, removes and lists extensions against one configuration file.
pub struct ExtensionManager {
    config_path: PathBuf,
    config: ConfigTree,
    roots: Roots,
    tmp_dir: PathBuf,
    dry_run: bool,
    service_groups: ServiceGroups,
    logger: Box<dyn Logger>,
}

impl ExtensionManager {
    /// Creates a manager for the configuration loaded from `config_path`.
    pub fn new(
        config_path: impl Into<PathBuf>,
        config: ConfigTree,
        options: ManagerOptions,
        logger: Box<dyn Logger>,
    ) -> Result<Self, ExtensionError> {
        let roots = Roots::from_config(&config, options.bin_root.as_deref())?;
        let tmp_dir = options.tmp_dir.unwrap_or_else(std::env::temp_dir);

        let manager = Self {
            config_path: config_path.into(),
            config,
            roots,
            tmp_dir,
            dry_run: options.dry_run,
            service_groups: options.service_groups,
            logger,
        };
        manager.log(&format!("root dictionary: {}", manager.roots), 4);
        Ok(manager)
    }

    /// Loads the configuration file and creates a manager printing to the console.
    pub fn open(
        config_path: &Path,
        options: ManagerOptions,
        verbosity: u8,
    ) -> Result<Self, ExtensionError> {
        let config = ConfigTree::load(config_path)?;
        Self::new(
            config_path,
            config,
            options,
            Box::new(ConsoleLogger::new(verbosity)),
        )
    }

    /// Returns the live configuration.
    #[must_use]
    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    /// Returns true if the manager only reports what it would do.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Lists installed extensions by their cached manifest directories.
    ///
    /// Each name is logged at level 0.
    pub fn enumerate_extensions(&self) -> Vec<String> {
        let ext_root = self.roots.get(RootKind::Ext);

        let mut names: Vec<String> = match fs::read_dir(ext_root) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_dir())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect(),
            Err(_) => {
                self.log(&format!("No extension cache '{}'", ext_root.display()), 2);
                Vec::new()
            }
        };
        names.sort();

        if names.is_empty() {
            self.log(&format!("Extension cache is '{}'", ext_root.display()), 2);
            self.log("No extensions installed", 0);
        }
        for name in &names {
            self.log(name, 0);
        }

        names
    }

    fn log(&self, message: &str, level: u8) {
        self.logger.log(message, level);
    }

    /// Writes the configuration back, keeping a backup of the previous file.
    fn save_config(&self) -> Result<Option<PathBuf>, ExtensionError> {
        if self.dry_run {
            return Ok(None);
        }

        let backup = self.config.save_with_backup(&self.config_path)?;
        match &backup {
            Some(path) => self.log(
                &format!(
                    "Saved configuration dictionary. Backup copy at {}",
                    path.display()
                ),
                0,
            ),
            None => self.log("Saved configuration dictionary", 0),
        }
        Ok(backup)
    }
}

/// Finds the root a file-group prefix installs into.
///
/// The longest entry of [`TARGET_DIRS`] that is a leading path of `prefix` wins.
#[must_use]
pub fn classify_prefix(prefix: &str) -> Option<RootKind> {
    let prefix = Path::new(prefix);
    TARGET_DIRS
        .iter()
        .filter(|(dir, _)| prefix.starts_with(dir))
        .max_by_key(|(dir, _)| Path::new(dir).components().count())
        .map(|(_, kind)| *kind)
}

/// Pairs every file group of a manifest with its root.
///
/// Fails on the first group with an unknown prefix, before anything is touched.
fn classify_groups(manifest: &InstallerManifest) -> Result<Vec<(&FileGroup, RootKind)>, ExtensionError> {
    manifest
        .files
        .iter()
        .map(|group| {
            classify_prefix(&group.prefix)
                .map(|kind| (group, kind))
                .ok_or_else(|| ExtensionError::UnknownDestination(group.prefix.clone()))
        })
        .collect()
}

/// Drops the first component of a `/`-separated path.
///
/// Returns `None` when there is only one component.
#[must_use]
pub fn strip_leading_dir(path: &str) -> Option<&str> {
    path.split_once('/')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}

/// Where a manifest file lands under `root`.
fn destination_path(root: &Path, file: &str) -> PathBuf {
    root.join(strip_leading_dir(file).unwrap_or(file))
}
