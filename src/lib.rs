//! weext
//!
//! Installs, removes and lists extensions for a weewx-style weather
//! station.
//!
//! # Architecture
//!
//! - **Config Module**: format-preserving TOML configuration store,
//!   conditional merge and install-root resolution
//! - **Extension Module**: staging, install, uninstall and enumeration
//! - **Logging Module**: leveled progress logger and `tracing` setup
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use weext::extension::{ExtensionManager, ManagerOptions};
//!
//! let mut manager = ExtensionManager::open(
//!     Path::new("/opt/weewx/weewx.toml"),
//!     ManagerOptions::default(),
//!     1,
//! )
//! .expect("Failed to open configuration");
//! manager
//!     .install_extension(Path::new("pmon-0.4.tar.gz"))
//!     .expect("Install failed");
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod extension;
pub mod logging;

// Re-export main types
pub use config::{ConfigError, ConfigTree, RootKind, Roots};
pub use extension::{ExtensionError, ExtensionManager, InstallReport, ManagerOptions, UninstallReport};
pub use logging::{ConsoleLogger, Logger};
