// Tracing setup
//
// Logs go to stderr; stdout is reserved for command summaries.

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count. `RUST_LOG` takes precedence when set.
pub fn filter_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "info,chatmimic=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Call once, from `main`.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .init();
}
