/// Initialize tracing for binaries and tests.
///
/// Parses `default_level` leniently (falling back to `info`) and installs a
/// plain fmt subscriber. Uses `try_init` so repeated calls, e.g. from tests
/// or an embedding application, are harmless.
pub fn init(default_level: &str) {
    let level = default_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
