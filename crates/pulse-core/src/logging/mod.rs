use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the JSON subscriber on stderr.
///
/// `quiet` limits output to errors; otherwise info and above. `RUST_LOG`, when
/// set, replaces the default directive.
pub fn init_logging(quiet: bool) {
    let directive = if quiet { "pulse=error" } else { "pulse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(filter)
        .init();
}
