//! Logging and observability
//!
//! Structured logging via `tracing-subscriber`, text or JSON formatted,
//! selected at runtime through arguments or environment variables.
//!
//! All logging output is directed to stderr so stdout stays reserved for
//! command output and machine-readable results (e.g. `devrun plan`).

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with an optional format
///
/// Safe to call multiple times; only the first call installs the subscriber.
///
/// ## Environment Variables
///
/// * `DEVRUN_LOG_FORMAT` - `json` for JSON output, anything else for text
/// * `DEVRUN_LOG` - filter directives (falls back to `RUST_LOG`, then `info`)
/// * `DEVRUN_LOG_SPAN_EVENTS` - comma separated span events (`new`, `close`, `full`, ...)
///
/// ## Example
///
/// ```rust
/// use devrun_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// assert!(logging::is_initialized());
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("DEVRUN_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter based on environment variables
fn create_env_filter() -> EnvFilter {
    if let Ok(devrun_log) = std::env::var("DEVRUN_LOG") {
        EnvFilter::try_new(&devrun_log).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid DEVRUN_LOG specification '{}', using default 'info'",
                devrun_log
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Span lifecycle events to emit; env var overrides the per-format default
fn span_events_for_format(format: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    if let Ok(raw) = std::env::var("DEVRUN_LOG_SPAN_EVENTS") {
        return parse_span_events(&raw);
    }

    match format {
        "json" => FmtSpan::NEW | FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

fn parse_span_events(raw: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    let mut acc = FmtSpan::NONE;
    for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
        acc |= match token.as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        };
    }
    acc
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::format::FmtSpan;

    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_init_multiple_calls_safe() {
        let _guard = TEST_MUTEX.lock().unwrap();

        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("text")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_parse_span_events() {
        assert_eq!(parse_span_events("none"), FmtSpan::NONE);
        assert_eq!(parse_span_events("new,close"), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(parse_span_events("NEW | Close"), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(parse_span_events("bogus"), FmtSpan::NONE);
    }

    #[test]
    fn test_env_filter_creation() {
        let _guard = TEST_MUTEX.lock().unwrap();

        std::env::set_var("DEVRUN_LOG", "trace");
        let _filter = create_env_filter();
        std::env::set_var("DEVRUN_LOG", "invalid_spec_@@[");
        let _filter = create_env_filter();
        std::env::remove_var("DEVRUN_LOG");
    }
}
