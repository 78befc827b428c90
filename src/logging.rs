use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "BOOKINGS_HELPER_LOG";
pub const DEFAULT_FILTER: &str = "bookings_helper=info";

/// Installs the global subscriber, writing to stderr. Calling it again is a no-op.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
