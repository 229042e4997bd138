use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "geoplot_tools=info,geoplot=info";

/// Installs a stderr subscriber filtered by `RUST_LOG`, so stdout stays free
/// for summaries.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
