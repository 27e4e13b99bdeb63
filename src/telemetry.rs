//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL replaces the default filter entirely (e.g. "debug" or
//!   "info,session=trace").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.

use tracing_subscriber::EnvFilter;

/// Log targets this crate emits, with their default level.
const TARGET_LEVELS: &[(&str, &str)] = &[
    // startup inventory, store queries, fetches, WS traffic
    ("lesson_tasks", "debug"),
    // loads, transitions, evictions and sweeps
    ("session", "debug"),
    // skipped or migrated documents
    ("task_codec", "info"),
    // tasks whose data cannot be evaluated
    ("evaluator", "info"),
    ("tower_http", "info"),
    ("axum", "info"),
];

fn default_directives() -> String {
    let mut out = String::from("info");
    for (target, level) in TARGET_LEVELS {
        out.push_str(&format!(",{target}={level}"));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env_value(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(default_directives()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
