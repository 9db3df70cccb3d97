use tracing_subscriber::{prelude::*, util::TryInitError, EnvFilter, Registry};

/// Initialize tracing
///
/// Errors instead of panicking when a global subscriber is already installed.
pub fn init() -> Result<(), TryInitError> {
    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default().with(logger).with(env_filter).try_init()
}
