// Logging setup - stderr output plus optional rotating JSON files
//
// Search results go to stdout, so human-readable logs always go to stderr.
// File logging writes JSON lines through a non-blocking writer; the returned
// guard must be kept alive for the duration of the program to flush them.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogRotation, LoggingConfig};

/// Filter precedence: RUST_LOG env var > config file > default "info"
fn filter(config: &LoggingConfig) -> EnvFilter {
    let default_filter = default_directive(&config.level);
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into())
}

/// A bare level scopes to this crate; anything else is used as a directive
fn default_directive(level: &str) -> String {
    let level = level.trim();
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => {
            format!("maktaba={},warn", level.to_lowercase())
        }
        _ if level.is_empty() => "maktaba=info,warn".to_string(),
        _ => level.to_string(),
    }
}

fn appender(config: &LoggingConfig) -> RollingFileAppender {
    match config.file_rotation {
        LogRotation::Hourly => {
            tracing_appender::rolling::hourly(&config.file_dir, &config.file_prefix)
        }
        LogRotation::Daily => {
            tracing_appender::rolling::daily(&config.file_dir, &config.file_prefix)
        }
        LogRotation::Never => {
            tracing_appender::rolling::never(&config.file_dir, &config.file_prefix)
        }
    }
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = filter(config);
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if config.file_enabled {
        if let Err(e) = std::fs::create_dir_all(&config.file_dir) {
            eprintln!(
                "Warning: Could not create log directory {:?}: {}",
                config.file_dir, e
            );
        } else {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender(config));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
            return Some(guard);
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .init();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_scopes_to_crate() {
        assert_eq!(default_directive("DEBUG"), "maktaba=debug,warn");
        assert_eq!(default_directive(""), "maktaba=info,warn");
    }

    #[test]
    fn test_directive_passes_through() {
        assert_eq!(default_directive("maktaba::engine=trace"), "maktaba::engine=trace");
    }
}
