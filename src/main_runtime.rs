use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use vigil::config::LoggingConfig;

fn default_filter(level: &str) -> String {
    if level.eq_ignore_ascii_case("info") {
        "info,vigil=debug".to_string()
    } else {
        level.to_string()
    }
}

/// Open the daily rolling appender under `log_dir`, or None when the
/// directory is not writable
fn file_writer(log_dir: &str) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Could not create log directory {log_dir} ({e}), file logging disabled");
        return None;
    }

    // `rolling::daily` panics if the first file cannot be created
    let probe = std::path::Path::new(log_dir).join(".vigil_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            let appender = tracing_appender::rolling::daily(log_dir, "vigil.log");
            Some(tracing_appender::non_blocking(appender))
        }
        Err(e) => {
            eprintln!("Warning: Could not write to log directory {log_dir} ({e}), file logging disabled");
            None
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// level; `VIGIL_LOG_DIR` overrides `logging.dir`. The returned guard must
/// live until exit or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::{Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let log_dir = std::env::var("VIGIL_LOG_DIR")
        .ok()
        .or_else(|| config.dir.clone());

    let (file_layer, guard) = match log_dir.as_deref().and_then(file_writer) {
        Some((writer, guard)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false) // No color codes in file
                    .with_target(true),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {dir}/vigil.log");
    }
    guard
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
