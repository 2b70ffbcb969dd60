use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_subscriber() {
    // Sets the default log level from RUST_LOG env var, defaulting to INFO
    // for pluto_backend and tower_http if not set.
    // Uses a JSON formatter for structured logging.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pluto_backend=info,tower_http=info".into()),
        )
        .with(fmt::layer().json())
        .init();

    tracing::info!("Tracing subscriber initialized.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_subscriber_runs() {
        // Use try_init() to avoid panicking if a subscriber is already set
        // globally by another test running concurrently.
        let _ = tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pluto_backend=info,tower_http=info".into()),
            )
            .with(fmt::layer().json())
            .try_init();
    }
}
