use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the process-wide tracing subscriber.
///
/// The filter comes from `RUST_LOG`, then `LOG_LEVEL`, then the build
/// profile. Must run before any invocation is served.
pub fn init(service: &str) -> Result<(), TelemetryError> {
    let env_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    });
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(env_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(env_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|err| {
        if tracing::dispatcher::has_been_set() {
            TelemetryError::AlreadyInitialized
        } else {
            TelemetryError::Install(err)
        }
    })?;

    tracing::debug!(service, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_global() {
        INIT.call_once(|| {
            init("test-service").expect("init failed");
        });
    }

    #[test]
    fn init_is_idempotent() {
        init_global();
        assert!(matches!(
            init("test-service"),
            Err(TelemetryError::AlreadyInitialized)
        ));
    }
}
