//! weext - Main entry point.
//!
//! Installs, removes and lists station extensions.
//!
//! Usage: weext <ACTION> [OPTIONS]
//!
//! Actions:
//!   --list               List installed extensions
//!   --install PATH       Install from an archive or directory
//!   --uninstall NAME     Remove an installed extension
//!   --version, -v        Show version
//!
//! Options:
//!   --config FILE        Configuration file
//!   --bin-root DIR       Override the code directory
//!   --tmpdir DIR         Where archives are extracted
//!   --dry-run            Print what would happen without doing it
//!   --verbosity N        Console detail level (default 1)
//!   --log-level LEVEL    Diagnostic level (trace, debug, info, warn, error, off)
//!   --log-file           Write diagnostics to a log file

use std::env;
use std::path::PathBuf;
use std::process;

use weext::extension::{ExtensionError, ExtensionManager, ManagerOptions};
use weext::logging::{self, DEFAULT_LOG_LEVEL, DEFAULT_VERBOSITY, LogConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "Usage: weext (--list | --install PATH | --uninstall NAME) \
[--config FILE] [--bin-root DIR] [--tmpdir DIR] [--dry-run] [--verbosity N] [--log-level LEVEL] [--log-file]";

/// Requested operation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    List,
    Install(PathBuf),
    Uninstall(String),
    Version,
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Cli {
    action: Action,
    config_path: PathBuf,
    options: ManagerOptions,
    verbosity: u8,
    log_level: String,
    log_file: bool,
}

impl Cli {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut action = None;
        let mut config_path = None;
        let mut options = ManagerOptions::default();
        let mut verbosity = DEFAULT_VERBOSITY;
        let mut log_level = DEFAULT_LOG_LEVEL.to_string();
        let mut log_file = false;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let flag = arg.as_str();
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("{} requires a value", flag))
            };

            match flag {
                "--version" | "-v" => action = Some(Action::Version),
                "--list" => action = Some(Action::List),
                "--install" => action = Some(Action::Install(PathBuf::from(value(flag)?))),
                "--uninstall" => action = Some(Action::Uninstall(value(flag)?)),
                "--config" => config_path = Some(PathBuf::from(value(flag)?)),
                "--bin-root" => options.bin_root = Some(PathBuf::from(value(flag)?)),
                "--tmpdir" => options.tmp_dir = Some(PathBuf::from(value(flag)?)),
                "--dry-run" => options.dry_run = true,
                "--log-file" => log_file = true,
                "--log-level" => log_level = LogConfig::parse_level(&value(flag)?),
                "--verbosity" => {
                    let raw = value(flag)?;
                    verbosity = raw
                        .parse()
                        .map_err(|_| format!("Invalid verbosity '{}'", raw))?;
                }
                other => return Err(format!("Unknown argument '{}'", other)),
            }
        }

        let action = action.ok_or_else(|| "No action given".to_string())?;

        Ok(Self {
            action,
            config_path: config_path.unwrap_or_else(default_config_path),
            options,
            verbosity,
            log_level,
            log_file,
        })
    }
}

/// Returns `$WEEWX_ROOT/weewx.toml`, or `weewx.toml` in the working directory.
fn default_config_path() -> PathBuf {
    env::var_os("WEEWX_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weewx.toml")
}

fn run(cli: Cli) -> Result<(), ExtensionError> {
    let mut manager = ExtensionManager::open(&cli.config_path, cli.options, cli.verbosity)?;
    if manager.is_dry_run() {
        println!("This is a dry run. Nothing will actually be done.");
    }

    match cli.action {
        Action::List => {
            manager.enumerate_extensions();
        }
        Action::Install(path) => {
            manager.install_extension(&path)?;
        }
        Action::Uninstall(name) => {
            manager.uninstall_extension(&name)?;
        }
        Action::Version => {}
    }

    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let cli = match Cli::parse(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            process::exit(2);
        }
    };

    if cli.action == Action::Version {
        println!("weext v{}", VERSION);
        return;
    }

    let log_config = LogConfig {
        level: cli.log_level.clone(),
        to_file: cli.log_file,
    };
    if let Err(e) = logging::init(&log_config) {
        eprintln!("Logging disabled: {}", e);
    }

    if let Err(e) = run(cli) {
        tracing::error!("{}", e);
        if e.is_fatal() {
            eprintln!("{}", e);
        } else {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_install() {
        let cli = Cli::parse(&args(&[
            "--install",
            "pmon.tar.gz",
            "--config",
            "/etc/weewx/weewx.toml",
            "--dry-run",
            "--verbosity",
            "3",
        ]))
        .unwrap();

        assert_eq!(cli.action, Action::Install(PathBuf::from("pmon.tar.gz")));
        assert_eq!(cli.config_path, PathBuf::from("/etc/weewx/weewx.toml"));
        assert!(cli.options.dry_run);
        assert_eq!(cli.verbosity, 3);
        assert_eq!(cli.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_parse_log_level() {
        let cli = Cli::parse(&args(&["--list", "--log-level", "DEBUG", "--log-file"])).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(cli.log_file);

        let cli = Cli::parse(&args(&["--list", "--log-level", "warning"])).unwrap();
        assert_eq!(cli.log_level, "warn");

        let cli = Cli::parse(&args(&["--list", "--log-level", "chatty"])).unwrap();
        assert_eq!(cli.log_level, DEFAULT_LOG_LEVEL);

        assert!(Cli::parse(&args(&["--list", "--log-level"])).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Cli::parse(&args(&[])).is_err());
        assert!(Cli::parse(&args(&["--uninstall"])).is_err());
        assert!(Cli::parse(&args(&["--list", "--verbosity", "loud"])).is_err());
        assert!(Cli::parse(&args(&["--frobnicate"])).is_err());
    }
}
