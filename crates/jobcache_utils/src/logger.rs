use std::sync::Once;

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the `tracing` filter directive.
pub const LOG_ENV: &str = "JOBCACHE_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Installs the global fmt subscriber. Safe to call more than once; only the
/// first call has an effect, and a subscriber installed elsewhere wins.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();

        if installed {
            debug!(env = LOG_ENV, "logging initialised");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_logging();
        init_logging();
    }
}
