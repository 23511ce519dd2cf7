use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "metascout=info,metascout_core=info";

/// Install a global `tracing` subscriber for an embedding application.
///
/// Honours `RUST_LOG`. Returns `false` when a subscriber was already set,
/// so calling it more than once is harmless.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
