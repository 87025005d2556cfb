use rdbg_trace::TraceEvent;

use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{LoggingConfig, RdbgConfig};

impl RdbgConfig {
    /// Validate semantic invariants. Reports as many problems as possible in
    /// one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_logging(self, &mut out);
        validate_connection(self, &mut out);
        validate_trace(self, &mut out);

        out
    }
}

fn validate_logging(config: &RdbgConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
    if config.logging.buffer_lines == 0 {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "logging.buffer_lines".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
}

fn validate_connection(config: &RdbgConfig, out: &mut ValidationDiagnostics) {
    if config.connection.port == 0 {
        out.errors.push(ConfigValidationError::PortZero);
    }
    if config.connection.reply_timeout_ms == 0 {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "connection.reply_timeout_ms".to_string(),
            message: "must be >= 1".to_string(),
        });
    }
}

fn validate_trace(config: &RdbgConfig, out: &mut ValidationDiagnostics) {
    let trace = &config.trace;
    for event in &trace.events {
        if TraceEvent::parse(event.trim()).is_none() {
            out.errors.push(ConfigValidationError::UnknownTraceEvent {
                event: event.clone(),
            });
        }
    }
    if matches!(trace.filter_regexp.as_deref(), Some(filter) if filter.trim().is_empty()) {
        out.warnings.push(ConfigWarning::FilterRegexpEmpty);
    }

    let positive = [
        ("trace.window.initial_groups", trace.window.initial_groups),
        ("trace.window.step", trace.window.step),
        ("trace.page_size.line", trace.page_size.line),
        ("trace.page_size.call", trace.page_size.call),
        ("trace.page_size.exception", trace.page_size.exception),
    ];
    for (toml_path, value) in positive {
        if value == 0 {
            out.errors.push(ConfigValidationError::InvalidValue {
                toml_path: toml_path.to_string(),
                message: "must be >= 1".to_string(),
            });
        }
    }
}
