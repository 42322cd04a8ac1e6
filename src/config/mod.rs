//! Configuration store for the station configuration file.
//!
//! The file is TOML, held as a `toml_edit` document so that comments,
//! whitespace and key order written by the user survive a load/save cycle.
//! Extension fragments arrive as plain `toml` tables and are merged into the
//! document without touching anything already present, so an install
//! followed by an uninstall leaves the file as it was.

mod merge;
pub mod roots;

pub use merge::{conditional_merge, prepend_path, remove_and_prune};
pub use roots::{RootKind, Roots};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item, Table, TomlError};

/// Separator placed above sections added on behalf of an extension.
pub const MAJOR_COMMENT_BLOCK: &[&str] = &[
    "",
    "##############################################################################",
    "",
];

/// Errors that can occur while loading, querying or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed.
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML.
    #[error("Failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: TomlError,
    },
    /// A key required to derive the install roots is absent.
    #[error("Missing configuration key: {0}")]
    MissingKey(String),
}

/// Hierarchical configuration document.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    doc: DocumentMut,
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        self.render() == other.render()
    }
}

impl ConfigTree {
    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self, TomlError> {
        let doc = text.parse::<DocumentMut>()?;
        Ok(Self { doc })
    }

    /// Loads the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns true if a top-level key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.doc.contains_key(key)
    }

    /// Looks up an item by its path of keys.
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&Item> {
        let (first, rest) = path.split_first()?;
        let mut item = self.doc.get(first)?;
        for key in rest {
            item = item.get(*key)?;
        }
        Some(item)
    }

    /// Looks up a string value by its path of keys.
    #[must_use]
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Item::as_str)
    }

    /// Looks up a section by its path of keys.
    #[must_use]
    pub fn section(&self, path: &[&str]) -> Option<&Table> {
        if path.is_empty() {
            return Some(self.doc.as_table());
        }
        self.get(path).and_then(Item::as_table)
    }

    /// Looks up a section for in-place edits.
    pub fn section_mut(&mut self, path: &[&str]) -> Option<&mut Table> {
        let mut table = self.doc.as_table_mut();
        for key in path {
            table = table.get_mut(key)?.as_table_mut()?;
        }
        Some(table)
    }

    /// Returns the section at `path`, creating missing sections on the way.
    ///
    /// Sections created only to hold the next one get no header of their own.
    /// Returns `None` when a key on the path already holds a non-section value.
    pub fn ensure_section(&mut self, path: &[&str]) -> Option<&mut Table> {
        let mut table = self.doc.as_table_mut();
        for (depth, key) in path.iter().enumerate() {
            let intermediate = depth + 1 < path.len();
            table = table
                .entry(key)
                .or_insert_with(|| {
                    let mut section = Table::new();
                    section.set_implicit(intermediate);
                    Item::Table(section)
                })
                .as_table_mut()?;
        }
        Some(table)
    }

    /// Writes `lines` as the comment block above a top-level section header.
    ///
    /// Returns false if `section` is not a top-level section.
    pub fn set_section_comment(&mut self, section: &str, lines: &[String]) -> bool {
        let Some(table) = self.doc.get_mut(section).and_then(Item::as_table_mut) else {
            return false;
        };

        let mut prefix = lines.join("\n");
        prefix.push('\n');
        table.decor_mut().set_prefix(prefix);
        true
    }

    /// Merges `fragment` without replacing anything already present.
    pub fn merge_fragment(&mut self, fragment: &toml::Table) {
        conditional_merge(self.doc.as_table_mut(), fragment);
    }

    /// Removes every key named by `fragment`, dropping sections left empty.
    ///
    /// A removed section takes its comment block with it.
    pub fn remove_fragment(&mut self, fragment: &toml::Table) {
        remove_and_prune(self.doc.as_table_mut(), fragment);
    }

    /// Renders the configuration back to TOML text.
    #[must_use]
    pub fn render(&self) -> String {
        self.doc.to_string()
    }

    /// Writes the configuration to `path`, keeping a timestamped copy of the
    /// previous file.
    ///
    /// Returns the path of the backup, or `None` if there was no previous file.
    pub fn save_with_backup(&self, path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        let io_error = |path: &Path, source: io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let backup = if path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
            let mut name = path.as_os_str().to_os_string();
            name.push(format!(".{}", stamp));
            let backup = PathBuf::from(name);
            fs::copy(path, &backup).map_err(|e| io_error(&backup, e))?;
            Some(backup)
        } else {
            None
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
        staged
            .write_all(self.render().as_bytes())
            .map_err(|e| io_error(staged.path(), e))?;
        staged.persist(path).map_err(|e| io_error(path, e.error))?;

        tracing::debug!("Saved configuration to {}", path.display());
        Ok(backup)
    }
}
