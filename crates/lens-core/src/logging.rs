//! `tracing` subscriber setup.
//!
//! Output goes to stderr. `RUST_LOG` takes precedence over the level passed
//! in, so operators can raise verbosity per module without editing settings.

use tracing_subscriber::EnvFilter;

/// Build the filter used by [`init_subscriber`].
///
/// Falls back to `"info"` when `level` is not a valid directive.
pub fn build_filter(level: &str) -> EnvFilter {
    filter_from(std::env::var("RUST_LOG").ok().as_deref(), level)
}

fn filter_from(env: Option<&str>, level: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup. Subsequent calls are no-ops. With `json` set, events
/// are emitted as one JSON object per line; otherwise compact text.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = build_filter(level);

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    }
}
