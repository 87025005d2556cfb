use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use rdbg_trace::{PageSizes, RouterConfig, TraceEvent, TraceOptions, WindowConfig};
use thiserror::Error;

mod diagnostics;
mod logging;
mod validation;

pub use diagnostics::{
    ConfigDiagnostics, ConfigValidationError, ConfigWarning, ValidationDiagnostics,
};
pub use logging::{init_tracing, LogBuffer};

/// Environment variable consulted for the config path when `--config` is absent.
pub const RDBG_CONFIG_ENV_VAR: &str = "RDBG_INSPECTOR_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level, or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr (in addition to the in-memory buffer).
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path. If the file cannot be opened, file
    /// logging is disabled while other sinks remain active.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Number of log lines kept in memory.
    #[serde(default = "LoggingConfig::default_buffer_lines")]
    pub buffer_lines: usize,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn default_buffer_lines() -> usize {
        2_000
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Effective filter: `level` merged with `RUST_LOG` when that is set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
            buffer_lines: Self::default_buffer_lines(),
        }
    }
}

/// Where the rdbg debug adapter listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Upper bound on the wait for any single adapter reply.
    pub reply_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 12345,
            connect_timeout_ms: 5_000,
            reply_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Event kinds enabled by `start trace`: `line`, `call` and/or `exception`.
    pub events: Vec<String>,
    /// Only record events whose location matches this regular expression.
    pub filter_regexp: Option<String>,
    /// Cap on the number of records the debugger keeps.
    pub max_log_size: Option<u64>,
    pub window: WindowConfig,
    pub page_size: PageSizes,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            events: vec!["line".to_owned(), "call".to_owned(), "exception".to_owned()],
            filter_regexp: None,
            max_log_size: None,
            window: WindowConfig::default(),
            page_size: PageSizes::default(),
        }
    }
}

impl TraceConfig {
    /// Options for `enable-trace`. Unknown event names are skipped; they are
    /// reported by validation.
    pub fn trace_options(&self) -> TraceOptions {
        TraceOptions {
            events: self
                .events
                .iter()
                .filter_map(|event| TraceEvent::parse(event.trim()))
                .collect(),
            filter_regexp: self.filter_regexp.clone(),
            max_log_size: self.max_log_size,
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            window: self.window,
            page_sizes: self.page_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdbgConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn sanitize_error_message(message: &str) -> String {
    // `toml` and `serde` messages can echo user-provided scalar values, e.g.
    // `invalid type: string "secret", expected a boolean`.
    static QUOTED_STRING_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    static BACKTICKED_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let mut out = message.to_owned();
    if let Some(re) = QUOTED_STRING_RE
        .get_or_init(|| regex::Regex::new(r#""(?:\\.|[^"\\])*""#).ok())
        .as_ref()
    {
        out = re.replace_all(&out, r#""<redacted>""#).into_owned();
    }

    // `missing field `foo`` names a schema field and stays readable; unknown
    // fields/variants and invalid scalars are user-controlled.
    if out.contains("unknown field")
        || out.contains("unknown variant")
        || out.contains("invalid type:")
        || out.contains("invalid value:")
    {
        let boundary = out.find(", expected").unwrap_or(out.len());
        if let Some(re) = BACKTICKED_RE
            .get_or_init(|| regex::Regex::new(r"`[^`]*`").ok())
            .as_ref()
        {
            let head = re.replace_all(&out[..boundary], "`<redacted>`").into_owned();
            out = format!("{head}{}", &out[boundary..]);
        }
    }
    out
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(sanitize_error_message(err.message()))
    }
}

impl RdbgConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Load a config file and return diagnostics (unknown keys and semantic
    /// validation failures).
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<RdbgConfig>(text)?;

        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend_validation(config.validate());

        Ok((config, diagnostics))
    }

    /// Resolve and load the config used by the inspector binary: an explicit
    /// path, then [`RDBG_CONFIG_ENV_VAR`], else defaults. Validation errors
    /// make the load fail; unknown keys and warnings are logged.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var_os(RDBG_CONFIG_ENV_VAR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let (config, diagnostics) = Self::load_from_path_with_diagnostics(&path)?;
        for key in &diagnostics.unknown_keys {
            tracing::warn!(target: "rdbg.config", path = %path.display(), key = %key, "unknown config key");
        }
        for warning in &diagnostics.warnings {
            tracing::warn!(target: "rdbg.config", path = %path.display(), ?warning, "config warning");
        }
        if let Some(first) = diagnostics.errors.first() {
            return Err(ConfigError::Invalid(first.to_string()));
        }
        Ok(config)
    }
}
