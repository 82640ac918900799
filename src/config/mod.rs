//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::IpAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "deckmill";
const DEFAULT_HOST: &str = "127.0.0.1";
// Port 0 delegates port selection to the OS; the bound port is read back
// from the listener when download URLs are built.
const DEFAULT_PORT: u16 = 0;
const DEFAULT_TTL_SECS: u64 = 1800;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub(crate) const DEFAULT_MARP_CLI_PATH: &str = "marp";

/// Command-line arguments for the Deckmill binary.
#[derive(Debug, Parser)]
#[command(name = "deckmill", version, about = "Markdown-to-PPTX tool server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DECKMILL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the stdio tool server.
    Serve(Box<ServeArgs>),
    /// Convert a single Markdown file to a PPTX on disk.
    #[command(name = "render")]
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MarpOverride {
    /// Override the Marp CLI executable used for deck conversion.
    #[arg(long = "marp-cli-path", value_name = "PATH")]
    pub marp_cli_path: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub marp: MarpOverride,

    /// Override the download server host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the download server port (0 lets the OS choose).
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the time-to-live applied to published decks.
    #[arg(long = "artifacts-ttl-seconds", value_name = "SECONDS")]
    pub artifacts_ttl_seconds: Option<u64>,

    /// Override the cadence of the expired-artifact sweep.
    #[arg(long = "artifacts-sweep-interval-seconds", value_name = "SECONDS")]
    pub artifacts_sweep_interval_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: MarpOverride,

    /// Path to the Marp Markdown file to convert.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Path of the PPTX to write; defaults to the input with a .pptx extension.
    #[arg(short = 'o', long = "output", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub artifacts: ArtifactSettings,
    pub marp: MarpSettings,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy)]
pub struct ArtifactSettings {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct MarpSettings {
    pub cli_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DECKMILL").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_marp_override(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    artifacts: RawArtifactSettings,
    marp: RawMarpSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.artifacts_ttl_seconds {
            self.artifacts.ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.artifacts_sweep_interval_seconds {
            self.artifacts.sweep_interval_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_marp_override(&overrides.marp);
    }

    fn apply_marp_override(&mut self, overrides: &MarpOverride) {
        if let Some(path) = overrides.marp_cli_path.as_ref() {
            self.marp.cli_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            artifacts,
            marp,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            artifacts: build_artifact_settings(artifacts)?,
            marp: build_marp_settings(marp)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let host: IpAddr = host
        .parse()
        .map_err(|err| LoadError::invalid("server.host", format!("invalid address `{host}`: {err}")))?;

    let port = server.port.unwrap_or(DEFAULT_PORT);

    Ok(ServerSettings { host, port })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let ttl_seconds = artifacts.ttl_seconds.unwrap_or(DEFAULT_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "artifacts.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let sweep_seconds = artifacts
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if sweep_seconds == 0 {
        return Err(LoadError::invalid(
            "artifacts.sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ArtifactSettings {
        ttl: Duration::from_secs(ttl_seconds),
        sweep_interval: Duration::from_secs(sweep_seconds),
    })
}

fn build_marp_settings(marp: RawMarpSettings) -> Result<MarpSettings, LoadError> {
    let cli_path = marp
        .cli_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MARP_CLI_PATH));
    if cli_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "marp.cli_path",
            "path must not be empty",
        ));
    }

    Ok(MarpSettings { cli_path })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMarpSettings {
    cli_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.server.host.to_string(), "127.0.0.1");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.artifacts.ttl.as_secs(), 1800);
        assert_eq!(settings.artifacts.sweep_interval.as_secs(), 60);
        assert_eq!(settings.marp.cli_path, PathBuf::from("marp"));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.port, 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn port_zero_is_accepted() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(0);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.server.port, 0);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut raw = RawSettings::default();
        raw.artifacts.ttl_seconds = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero ttl must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "artifacts.ttl_seconds",
                ..
            }
        ));
    }

    #[test]
    fn ipv6_host_is_parsed() {
        let mut raw = RawSettings::default();
        raw.server.host = Some("::1".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.server.host.is_ipv6());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["deckmill"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_render_arguments() {
        let args = CliArgs::parse_from([
            "deckmill",
            "render",
            "--marp-cli-path",
            "/opt/marp/bin/marp",
            "deck.md",
            "-o",
            "/tmp/deck.pptx",
        ]);

        match args.command.expect("render command") {
            Command::Render(render) => {
                assert_eq!(
                    render.overrides.marp_cli_path.as_deref(),
                    Some(std::path::Path::new("/opt/marp/bin/marp"))
                );
                assert_eq!(render.input, std::path::Path::new("deck.md"));
                assert_eq!(
                    render.output.as_deref(),
                    Some(std::path::Path::new("/tmp/deck.pptx"))
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "deckmill",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--artifacts-ttl-seconds",
            "120",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(serve.overrides.artifacts_ttl_seconds, Some(120));
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
