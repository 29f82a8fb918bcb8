//! CLI argument parsing and config file support.
//!
//! Flags override values from the JSON config file, which override the
//! built-in defaults.

use std::path::{Path, PathBuf};

use plebwire_types::config::ProtocolConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_ADDR: &str = "/ip4/0.0.0.0/tcp/9000";
const DEFAULT_DATA_DIR: &str = "plebwire-data";
const DEFAULT_SEED_FILE: &str = "subplebbit.seed";

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub listen_addr: Option<String>,
    pub bootstrap_nodes: Vec<String>,
    pub title: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub help: bool,
}

impl CliArgs {
    pub fn parse_from_env() -> Result<Self, String> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parses flags, not including the program name.
    pub fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cli = Self::default();
        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let mut value = || args.next().ok_or_else(|| format!("{flag} needs a value"));
            match flag.as_str() {
                "--config" => cli.config_path = Some(PathBuf::from(value()?)),
                "--data-dir" => cli.data_dir = Some(PathBuf::from(value()?)),
                "--listen" => cli.listen_addr = Some(value()?),
                "--bootstrap" => cli.bootstrap_nodes.push(value()?),
                "--title" => cli.title = Some(value()?),
                "--seed-file" => cli.seed_file = Some(PathBuf::from(value()?)),
                "--help" | "-h" => cli.help = true,
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(cli)
    }
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format.
///
/// ```json
/// {
///   "data_dir": "/var/lib/plebwire",
///   "listen_addr": "/ip4/0.0.0.0/tcp/9000",
///   "bootstrap_nodes": ["/ip4/203.0.113.1/tcp/9000"],
///   "title": "my board",
///   "protocol": { "page_size": 25 }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfigFile {
    pub data_dir: Option<String>,
    pub listen_addr: Option<String>,
    pub bootstrap_nodes: Option<Vec<String>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub seed_file: Option<String>,
    pub protocol: Option<ProtocolConfig>,
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub listen_addr: String,
    pub bootstrap_nodes: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Relative paths are resolved against `data_dir`.
    pub seed_file: PathBuf,
    pub protocol: ProtocolConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            bootstrap_nodes: Vec::new(),
            title: None,
            description: None,
            seed_file: PathBuf::from(DEFAULT_SEED_FILE),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Loads the config file named by `--config`, if any, and applies
    /// the remaining flags on top.
    pub fn resolve(cli: &CliArgs) -> Result<Self, String> {
        let base = match &cli.config_path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = base.merge_cli(cli);
        config
            .protocol
            .validate()
            .map_err(|e| format!("invalid protocol settings: {e}"))?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read config file: {e}"))?;
        let file: DaemonConfigFile = serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or(defaults.data_dir),
            listen_addr: file.listen_addr.unwrap_or(defaults.listen_addr),
            bootstrap_nodes: file.bootstrap_nodes.unwrap_or_default(),
            title: file.title,
            description: file.description,
            seed_file: file.seed_file.map(PathBuf::from).unwrap_or(defaults.seed_file),
            protocol: file.protocol.unwrap_or_default(),
        }
    }

    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(addr) = &cli.listen_addr {
            self.listen_addr = addr.clone();
        }
        self.bootstrap_nodes.extend(cli.bootstrap_nodes.iter().cloned());
        if cli.title.is_some() {
            self.title = cli.title.clone();
        }
        if let Some(seed) = &cli.seed_file {
            self.seed_file = seed.clone();
        }
        self
    }

    pub fn seed_path(&self) -> PathBuf {
        if self.seed_file.is_absolute() {
            self.seed_file.clone()
        } else {
            self.data_dir.join(&self.seed_file)
        }
    }
}

pub fn print_help() {
    println!(
        r#"plebwire-daemon - headless subplebbit node

USAGE:
    plebwire-daemon [OPTIONS]

OPTIONS:
    --config <PATH>          Load settings from a JSON config file
    --data-dir <PATH>        Data directory (default: ./{DEFAULT_DATA_DIR})
    --listen <MULTIADDR>     P2P listen address (default: {DEFAULT_LISTEN_ADDR})
    --bootstrap <MULTIADDR>  Add a bootstrap peer (repeatable)
    --title <TEXT>           Subplebbit title
    --seed-file <PATH>       Signing seed, created if missing (default: {DEFAULT_SEED_FILE})
    -h, --help               Show this help

ENVIRONMENT:
    RUST_LOG                 Log level filter (default: info)
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_are_parsed() -> Result<(), String> {
        let cli = CliArgs::parse(args(&[
            "--data-dir",
            "/tmp/x",
            "--bootstrap",
            "/ip4/1.2.3.4/tcp/1",
            "--bootstrap",
            "/ip4/5.6.7.8/tcp/2",
            "--title",
            "board",
        ]))?;
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(cli.bootstrap_nodes.len(), 2);
        assert_eq!(cli.title.as_deref(), Some("board"));
        Ok(())
    }

    #[test]
    fn missing_value_and_unknown_flag_rejected() {
        assert!(CliArgs::parse(args(&["--listen"])).is_err());
        assert!(CliArgs::parse(args(&["--relay"])).is_err());
    }

    #[test]
    fn flags_override_file() -> Result<(), String> {
        let file: DaemonConfigFile = serde_json::from_str(
            r#"{"data_dir": "/srv/pw", "title": "from file", "bootstrap_nodes": ["/ip4/1.1.1.1/tcp/1"], "protocol": {"page_size": 7}}"#,
        )
        .map_err(|e| e.to_string())?;
        let cli = CliArgs::parse(args(&["--title", "from flag", "--bootstrap", "/ip4/2.2.2.2/tcp/2"]))?;
        let config = DaemonConfig::from_file(file).merge_cli(&cli);

        assert_eq!(config.data_dir, PathBuf::from("/srv/pw"));
        assert_eq!(config.title.as_deref(), Some("from flag"));
        assert_eq!(config.bootstrap_nodes.len(), 2);
        assert_eq!(config.protocol.page_size, 7);
        assert_eq!(config.seed_path(), PathBuf::from("/srv/pw").join(DEFAULT_SEED_FILE));
        Ok(())
    }

    #[test]
    fn config_file_round_trip() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let path = dir.path().join("daemon.json");
        std::fs::write(&path, r#"{"listen_addr": "/ip4/127.0.0.1/tcp/0"}"#).map_err(|e| e.to_string())?;
        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };
        let config = DaemonConfig::resolve(&cli)?;
        assert_eq!(config.listen_addr, "/ip4/127.0.0.1/tcp/0");
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        Ok(())
    }

    #[test]
    fn invalid_protocol_settings_rejected() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let path = dir.path().join("daemon.json");
        std::fs::write(&path, r#"{"protocol": {"page_size": 0}}"#).map_err(|e| e.to_string())?;
        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };
        assert!(DaemonConfig::resolve(&cli).is_err());
        Ok(())
    }
}
