use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Sets up the tracing subscriber for the gateway.
///
/// `log_enabled` raises the default level to debug so backend results and
/// warnings become visible; RUST_LOG still wins when set.
pub fn init_logger(log_enabled: bool) {
    let default_level = if log_enabled { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .expect("Failed to initialize logger");
}
