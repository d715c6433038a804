//! Layers CLI flags over an optional TOML file over built-in defaults
//! into a [`ReflectorConfig`] (§6.1).

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::error::ReflectorError;

/// Runtime choice of socket binding, replacing the original's
/// compile-time dual-stack build flags (§9 redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    V4,
    V6,
    Dual,
}

impl std::str::FromStr for BindMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v4" => Ok(BindMode::V4),
            "v6" => Ok(BindMode::V6),
            "dual" => Ok(BindMode::Dual),
            other => Err(format!("unknown bind mode '{other}', expected v4, v6, or dual")),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "urf-reflector", about = "URF/XLX digital-voice peering reflector")]
pub struct Args {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// This reflector's callsign.
    #[arg(long)]
    pub callsign: Option<String>,

    /// Socket binding: v4, v6, or dual.
    #[arg(long, value_name = "MODE")]
    pub bind: Option<BindMode>,

    /// UDP port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Increase log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    reflector_callsign: Option<String>,
    bind_mode: Option<BindMode>,
    listen_port: Option<u16>,
    transmitter_allow_file: Option<PathBuf>,
    node_allow_file: Option<PathBuf>,
    peer_allow_file: Option<PathBuf>,
    blacklist_file: Option<PathBuf>,
    access_list_poll_interval_ms: Option<u64>,
    keepalive_period_ms: Option<u64>,
    keepalive_timeout_ms: Option<u64>,
    reconnect_period_ms: Option<u64>,
    stream_timeout_ms: Option<u64>,
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    pub reflector_callsign: String,
    pub bind_mode: BindMode,
    pub listen_port: u16,
    pub transmitter_allow_file: PathBuf,
    pub node_allow_file: PathBuf,
    pub peer_allow_file: PathBuf,
    pub blacklist_file: PathBuf,
    pub access_list_poll_interval_ms: u64,
    pub keepalive_period_ms: u64,
    pub keepalive_timeout_ms: u64,
    pub reconnect_period_ms: u64,
    pub stream_timeout_ms: u64,
    pub log_level: String,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            reflector_callsign: "REFLECT".to_string(),
            bind_mode: BindMode::Dual,
            listen_port: 10_017,
            transmitter_allow_file: PathBuf::from("TRANSMITTER_ALLOW.TXT"),
            node_allow_file: PathBuf::from("NODE_ALLOW.TXT"),
            peer_allow_file: PathBuf::from("PEER_ALLOW.TXT"),
            blacklist_file: PathBuf::from("BLACKLIST.TXT"),
            access_list_poll_interval_ms: 5_000,
            keepalive_period_ms: 5_000,
            keepalive_timeout_ms: 11_000,
            reconnect_period_ms: 10_000,
            stream_timeout_ms: 200,
            log_level: "info".to_string(),
        }
    }
}

impl ReflectorConfig {
    /// Layers defaults, an optional file, then CLI flags.
    pub async fn load(args: &Args) -> Result<Self, ReflectorError> {
        let mut config = ReflectorConfig::default();

        if let Some(path) = &args.config {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ReflectorError::config(format!("cannot read {}: {e}", path.display())))?;
            let file: ConfigFile = toml::from_str(&text)
                .map_err(|e| ReflectorError::config(format!("cannot parse {}: {e}", path.display())))?;
            config.apply_file(file);
        }

        config.apply_args(args);
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.reflector_callsign {
            self.reflector_callsign = v;
        }
        if let Some(v) = file.bind_mode {
            self.bind_mode = v;
        }
        if let Some(v) = file.listen_port {
            self.listen_port = v;
        }
        if let Some(v) = file.transmitter_allow_file {
            self.transmitter_allow_file = v;
        }
        if let Some(v) = file.node_allow_file {
            self.node_allow_file = v;
        }
        if let Some(v) = file.peer_allow_file {
            self.peer_allow_file = v;
        }
        if let Some(v) = file.blacklist_file {
            self.blacklist_file = v;
        }
        if let Some(v) = file.access_list_poll_interval_ms {
            self.access_list_poll_interval_ms = v;
        }
        if let Some(v) = file.keepalive_period_ms {
            self.keepalive_period_ms = v;
        }
        if let Some(v) = file.keepalive_timeout_ms {
            self.keepalive_timeout_ms = v;
        }
        if let Some(v) = file.reconnect_period_ms {
            self.reconnect_period_ms = v;
        }
        if let Some(v) = file.stream_timeout_ms {
            self.stream_timeout_ms = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(callsign) = &args.callsign {
            self.reflector_callsign = callsign.clone();
        }
        if let Some(bind) = args.bind {
            self.bind_mode = bind;
        }
        if let Some(port) = args.port {
            self.listen_port = port;
        }
        if args.verbose > 0 {
            self.log_level = match args.verbose {
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mode_parses_case_insensitively() {
        assert_eq!("V4".parse::<BindMode>().unwrap(), BindMode::V4);
        assert_eq!("dual".parse::<BindMode>().unwrap(), BindMode::Dual);
        assert!("quad".parse::<BindMode>().is_err());
    }

    #[tokio::test]
    async fn cli_flags_override_defaults() {
        let args = Args {
            config: None,
            callsign: Some("N7TAE".to_string()),
            bind: Some(BindMode::V4),
            port: Some(12345),
            verbose: 1,
        };
        let config = ReflectorConfig::load(&args).await.unwrap();
        assert_eq!(config.reflector_callsign, "N7TAE");
        assert_eq!(config.bind_mode, BindMode::V4);
        assert_eq!(config.listen_port, 12345);
        assert_eq!(config.log_level, "debug");
    }

    #[tokio::test]
    async fn file_layer_overrides_defaults_but_not_cli() {
        let dir = std::env::temp_dir().join(format!("urf-cfg-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("urf-reflector.toml");
        tokio::fs::write(&path, "reflector_callsign = \"FROMFILE\"\nlisten_port = 9999\n")
            .await
            .unwrap();

        let args = Args {
            config: Some(path.clone()),
            callsign: None,
            bind: None,
            port: Some(1),
            verbose: 0,
        };
        let config = ReflectorConfig::load(&args).await.unwrap();
        assert_eq!(config.reflector_callsign, "FROMFILE");
        assert_eq!(config.listen_port, 1);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
