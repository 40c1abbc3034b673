//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber.
///
/// `DEBUG` (any non-empty value) lowers the default level to debug and adds
/// source locations; `LOG_FORMAT=json` emits JSON lines. `RUST_LOG` wins over
/// both levels when set.
pub fn init() {
    let debug = std::env::var("DEBUG").is_ok_and(|v| !v.is_empty());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(debug)
                    .with_line_number(debug),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(debug)
                    .with_file(debug)
                    .with_line_number(debug),
            )
            .init();
    }

    tracing::debug!("debug logging enabled");
}
