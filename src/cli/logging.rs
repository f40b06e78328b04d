//! Tracing setup
//!
//! Console output is human-readable or JSON; an optional directory receives
//! JSON logs in daily rolling files. `RUST_LOG` overrides the default filter.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::cli::args::LogFormat;
use crate::cli::{Error, Result};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str =
    "fraudguard=info,fraudguard_core=info,fraudguard_api=info,tower_http=info";

/// File name prefix of rolling log files
pub const LOG_FILE_PREFIX: &str = "fraudguard.log";

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the lifetime of the process.
pub fn init_tracing(format: LogFormat, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console = match format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(guard)
}
