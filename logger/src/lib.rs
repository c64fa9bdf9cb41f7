//! Logging setup for weir binaries.
//!
//! The processor runtime itself never calls into this crate: operators log through the
//! plain `log` facade (`log::info!`, `log::warn!`, ...) scoped under a `target` derived
//! from the vertex name, exactly as `Processor.Context::logger` is specified to behave.
//! This crate only wires up *where those records go* for a running process, mirroring
//! the split between a logging facade and a logging backend.

use regex::Regex;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Deserializable logging configuration, loaded from the pipeline's TOML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default level applied to targets with no more specific override.
    pub filter: String,
    /// Per-target level overrides, e.g. `"weir_core::window" = "trace"`.
    pub targets: Vec<(String, String)>,
    /// Whether to colorize level names; disabled automatically for non-tty output.
    pub color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            filter: "info".to_owned(),
            targets: Vec::new(),
            color: true,
        }
    }
}

/// Initializes the global logger. Idempotent: a second call is a no-op, matching
/// `env_logger`'s own `try_init` semantics, so tests and the CLI can both call it freely.
pub fn init(config: &LoggerConfig) {
    let mut builder = env_logger::Builder::new();
    builder.format(move |buf, record| {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(
            buf,
            "{} {:5} {} {}",
            now,
            record.level(),
            record.target(),
            record.args()
        )
    });

    let base = log::LevelFilter::from_str(&config.filter).unwrap_or(log::LevelFilter::Info);
    builder.filter_level(base);

    for (target, level) in &config.targets {
        if let Ok(level) = log::LevelFilter::from_str(level) {
            // a literal target name is a valid (anchored) regex of itself, so targets
            // configured either way resolve the same filter.
            if Regex::new(target).is_ok() {
                builder.filter_module(target, level);
            }
        }
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        let config = LoggerConfig::default();
        assert_eq!(config.filter, "info");
        assert!(config.targets.is_empty());
    }
}
