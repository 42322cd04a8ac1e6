//! Install roots derived from the station configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigTree};

/// Logical directories extension files can be installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// Station installation directory (`WEEWX_ROOT`).
    Weewx,
    /// Python code directory.
    Bin,
    /// Report skins.
    Skin,
    /// Generated HTML output.
    Html,
    /// User extensions code, `bin/user`.
    User,
    /// Cache of installed extension manifests.
    Ext,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Weewx => write!(f, "WEEWX_ROOT"),
            RootKind::Bin => write!(f, "BIN_ROOT"),
            RootKind::Skin => write!(f, "SKIN_ROOT"),
            RootKind::Html => write!(f, "HTML_ROOT"),
            RootKind::User => write!(f, "USER_ROOT"),
            RootKind::Ext => write!(f, "EXT_ROOT"),
        }
    }
}

/// Resolved absolute paths for every [`RootKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    weewx: PathBuf,
    bin: PathBuf,
    skin: PathBuf,
    html: PathBuf,
    user: PathBuf,
    ext: PathBuf,
}

impl Roots {
    /// Derives the roots from the station configuration.
    ///
    /// `bin_root` overrides the code directory, which otherwise defaults to
    /// `WEEWX_ROOT/bin`.
    pub fn from_config(config: &ConfigTree, bin_root: Option<&Path>) -> Result<Self, ConfigError> {
        let weewx = PathBuf::from(required(config, &["WEEWX_ROOT"])?);
        let skin = weewx.join(required(config, &["StdReport", "SKIN_ROOT"])?);
        let html = weewx.join(required(config, &["StdReport", "HTML_ROOT"])?);

        let bin = match bin_root {
            Some(path) => weewx.join(path),
            None => weewx.join("bin"),
        };
        let user = bin.join("user");
        let ext = user.join("installer");

        Ok(Self {
            weewx,
            bin,
            skin,
            html,
            user,
            ext,
        })
    }

    /// Returns the path for a root.
    #[must_use]
    pub fn get(&self, kind: RootKind) -> &Path {
        match kind {
            RootKind::Weewx => &self.weewx,
            RootKind::Bin => &self.bin,
            RootKind::Skin => &self.skin,
            RootKind::Html => &self.html,
            RootKind::User => &self.user,
            RootKind::Ext => &self.ext,
        }
    }
}

impl fmt::Display for Roots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = [
            RootKind::Weewx,
            RootKind::Bin,
            RootKind::Skin,
            RootKind::Html,
            RootKind::User,
            RootKind::Ext,
        ];
        let entries: Vec<String> = kinds
            .iter()
            .map(|kind| format!("{}: {}", kind, self.get(*kind).display()))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

fn required<'a>(config: &'a ConfigTree, path: &[&str]) -> Result<&'a str, ConfigError> {
    config
        .get_str(path)
        .ok_or_else(|| ConfigError::MissingKey(path.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> ConfigTree {
        ConfigTree::parse(text).unwrap()
    }

    const BASE: &str = r#"
WEEWX_ROOT = "/opt/weewx"

[StdReport]
SKIN_ROOT = "skins"
HTML_ROOT = "/var/www/html/weewx"
"#;

    #[test]
    fn test_roots_from_config() {
        let roots = Roots::from_config(&config(BASE), None).unwrap();

        assert_eq!(roots.get(RootKind::Weewx), Path::new("/opt/weewx"));
        assert_eq!(roots.get(RootKind::Bin), Path::new("/opt/weewx/bin"));
        assert_eq!(roots.get(RootKind::Skin), Path::new("/opt/weewx/skins"));
        assert_eq!(roots.get(RootKind::Html), Path::new("/var/www/html/weewx"));
        assert_eq!(roots.get(RootKind::User), Path::new("/opt/weewx/bin/user"));
        assert_eq!(
            roots.get(RootKind::Ext),
            Path::new("/opt/weewx/bin/user/installer")
        );
    }

    #[test]
    fn test_bin_root_override() {
        let roots = Roots::from_config(&config(BASE), Some(Path::new("/usr/share/weewx"))).unwrap();

        assert_eq!(roots.get(RootKind::Bin), Path::new("/usr/share/weewx"));
        assert_eq!(
            roots.get(RootKind::Ext),
            Path::new("/usr/share/weewx/user/installer")
        );
    }

    #[test]
    fn test_missing_key() {
        let err = Roots::from_config(&config("WEEWX_ROOT = \"/opt/weewx\"\n"), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(key) if key == "StdReport.SKIN_ROOT"));
    }

    #[test]
    fn test_display_lists_every_root() {
        let roots = Roots::from_config(&config(BASE), None).unwrap();
        let shown = roots.to_string();
        assert!(shown.contains("SKIN_ROOT: /opt/weewx/skins"));
        assert!(shown.contains("EXT_ROOT: /opt/weewx/bin/user/installer"));
    }
}
