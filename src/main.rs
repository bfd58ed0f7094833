use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use novel_stream_service::{
    AppConfig, AppState, DailyQuota, DeepInfraClient, InMemorySessionStore, SessionStore,
    TextGenerator, build_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(?config.listen_addr, "starting novel generation service");

    let client: Arc<dyn TextGenerator> = Arc::new(
        DeepInfraClient::new(&config.deepinfra_api_key)
            .with_base_url(&config.deepinfra_base_url),
    );
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.session_ttl));
    let quota = Arc::new(DailyQuota::new(config.daily_request_limit));

    let router = build_router(AppState {
        config: config.clone(),
        client,
        sessions,
        quota,
    });

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
