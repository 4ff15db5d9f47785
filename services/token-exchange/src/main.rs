use std::sync::Arc;

use token_exchange::config::TokenExchangeConfig;
use token_exchange::identity::HttpIdentityClient;
use token_exchange::{build_router, telemetry, AppState, SERVICE_NAME};
use tokio::net::TcpListener;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_sha() -> &'static str {
    option_env!("BUILD_SHA").unwrap_or("unknown")
}

fn build_time() -> &'static str {
    option_env!("BUILD_TIME").unwrap_or("unknown")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init(SERVICE_NAME)
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    let config = TokenExchangeConfig::load()?;
    let addr = config.socket_addr()?;

    let backend = HttpIdentityClient::new(&config.issuer)
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
    let state = AppState {
        backend: Arc::new(backend),
    };

    tracing::info!(
        event = "service_start",
        service = SERVICE_NAME,
        version = VERSION,
        build_sha = build_sha(),
        build_time = build_time(),
        listen_addr = %addr,
        issuer = %config.issuer.endpoint,
        "starting service"
    );

    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    tracing::info!(event = "service_stop", service = SERVICE_NAME);

    Ok(())
}
