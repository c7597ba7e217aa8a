use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "classmeta=info,warn";

/// Initialize logging facade with stderr output.
///
/// `quiet` lowers the default filter to warnings; an explicit `RUST_LOG` always wins.
pub fn init_logging(quiet: bool) {
    let default_filter = if quiet { "warn" } else { DEFAULT_FILTER };
    let init_result = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    let _ = init_result;
}
