use tracing_subscriber::{fmt, EnvFilter};

/// Directives appended to every filter so HTTP client internals stay quiet
/// unless asked for explicitly.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn"];

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Build the filter: `RUST_LOG` if set, otherwise `default_level`.
///
/// An unparsable `default_level` falls back to `info`.
pub fn build_filter(default_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = default_level.trim().to_string();
    for quiet in QUIET_DEPENDENCIES {
        directives.push(',');
        directives.push_str(quiet);
    }
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber in the requested format.
///
/// Safe to call multiple times (e.g. in tests); only the first call wins.
pub fn init(format: LogFormat, service_name: &str, default_level: &str) {
    let filter = build_filter(default_level);
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    match format {
        LogFormat::Human => {
            builder.with_thread_ids(false).try_init().ok();
        }
        LogFormat::Json => {
            builder
                .json()
                .with_current_span(false)
                .with_file(true)
                .with_line_number(true)
                .try_init()
                .ok();
        }
    }

    tracing::info!(service = service_name, format = ?format, "logging initialised");
}

/// Human-readable output.
pub fn init_logging(service_name: &str, default_level: &str) {
    init(LogFormat::Human, service_name, default_level);
}

/// JSON lines, one object per event.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    init(LogFormat::Json, service_name, default_level);
}
