use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{Error, Result};

pub const LOG_ENV: &str = "SVC_UPSERT_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: default_filter(),
        }
    }
}

/// `SVC_UPSERT_LOG`, then `RUST_LOG`, then the configured directive.
fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV) {
        match EnvFilter::try_new(&directive) {
            Ok(f) => return f,
            Err(err) => eprintln!("invalid {LOG_ENV} directive ({err}); ignoring"),
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.filter))
        .unwrap_or_else(|_| EnvFilter::new(default_filter()))
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free
/// for the command's own output.
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let filter = build_filter(cfg);
    let registry = tracing_subscriber::registry().with(filter);
    let res = match cfg.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    res.map_err(|e| Error::config(format!("failed to install log subscriber: {e}")))
}
