// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs to stderr and, once it is up, to journald.
pub fn init_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cfg!(debug_assertions) {
            "debug,cosmic_text=error,fontdb=error"
        } else {
            "info,cosmic_text=error,fontdb=error"
        })
    });
    let term = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false);
    // early in boot there usually is no journald yet
    let journald = tracing_journald::layer().ok();
    let has_journald = journald.is_some();

    tracing_subscriber::registry()
        .with(filter)
        .with(term)
        .with(journald)
        .try_init()?;
    log_panics::init();

    info!(
        "Version: {} ({})",
        std::env!("CARGO_PKG_VERSION"),
        std::option_env!("GIT_HASH").unwrap_or("unknown")
    );
    if !has_journald {
        debug!("journald not reachable, logging to stderr only");
    }

    Ok(())
}
