//! Logging setup shared by the CLI and embedding applications.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `default_directive` is used when `RUST_LOG` is not set, e.g. `"info"` or
/// `"pathtrace=debug"`. Returns false if a global subscriber already exists.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
