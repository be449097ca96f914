//! Tracing subscriber setup for the CLI binary.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `-v` selects debug-level engine
/// output. Events go to stderr so command output on stdout stays clean.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "packdeck=debug" } else { "packdeck=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
