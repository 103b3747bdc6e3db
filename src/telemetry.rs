//! Logging setup shared by both binaries

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber
///
/// `verbose` forces debug level; otherwise `RUST_LOG` applies, falling back
/// to info. Output goes to stderr so stdout stays free for tool output.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // A second init (e.g. from tests) keeps the first subscriber
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
