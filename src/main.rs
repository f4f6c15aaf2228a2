use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use places_relay::{
    config::Config,
    api::routes::create_router,
    AppState,
};

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Missing provider key is fatal
    let config = Config::load()?;
    let server_addr = config.server_addr;
    tracing::info!(
        %server_addr,
        ollama_url = %config.ollama_url,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        default_limit = %config.default_rate_limit,
        "starting places relay"
    );

    let app_state = AppState::from_config(config)?;

    let janitor = app_state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
        loop {
            ticker.tick().await;
            janitor.purge_expired();
        }
    });

    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!("listening on {}", server_addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
