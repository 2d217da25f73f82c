//! Logging setup: `tracing-subscriber` with an `EnvFilter`, toggled by
//! `--debug`. Follows the teacher's own `tracing_subscriber::registry()
//! .with(EnvFilter...).with(fmt::layer()).init()` wiring.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(debug: bool) {
    let default_directive = if debug { "rmote=debug,info" } else { "rmote=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
