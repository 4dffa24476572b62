//! Logging setup.
//!
//! Every crate in the workspace logs through `tracing`. This installs the
//! process-wide fmt subscriber; filtering comes from `GDRIVER_LOG` using
//! the usual `EnvFilter` directives (`info`, `gdriver_module=debug`, ...).

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "GDRIVER_LOG";

const DEFAULT_FILTER: &str = "info";

static LOGGING: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Safe to call more than once; a
/// subscriber installed by the host application is left in place.
pub fn init() {
    LOGGING.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init();

        match installed {
            Ok(()) => tracing::debug!(env = LOG_ENV, "logging initialized"),
            Err(_) => tracing::debug!("global subscriber already set, keeping it"),
        }
    });
}
