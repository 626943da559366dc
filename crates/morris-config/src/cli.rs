//! Command-line arguments for the server binary.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "morris-server", about = "Nine Men's Morris game server")]
pub struct CliArgs {
    /// Interface to listen on.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum concurrent connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Seconds of silence before a connection is dropped.
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(max) = args.max_connections {
            self.server.max_connections = max;
        }
        if let Some(secs) = args.idle_timeout {
            self.server.idle_timeout_seconds = secs;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from([
            "morris-server",
            "--port",
            "9100",
            "--idle-timeout",
            "10",
            "--log-level",
            "debug",
        ]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.idle_timeout_seconds, 10);
        assert_eq!(config.debug.log_level, "debug");
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.max_connections, 256);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_dir_flag() {
        let args = CliArgs::parse_from(["morris-server", "--config", "/tmp/morris-test"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/morris-test")));
    }
}
