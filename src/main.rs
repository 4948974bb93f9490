use std::sync::Arc;

use companion::{
    app,
    auth::Firebase,
    avatar::HeyGen,
    config::Config,
    db,
    dispatch::Dispatcher,
    llm::Gemini,
    weather::WeatherApi,
    AppState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("companion=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let db_pool = db::connect(&config.database_url).await?;
    let (dispatcher, workers) = Dispatcher::start(config.pool);

    let state = AppState::new(
        db_pool.clone(),
        Arc::new(Firebase::new(&config.firebase_api_key, config.http_timeout)?),
        Arc::new(Gemini::new(config.gemini_api_key.clone(), config.gemini_model.clone(), config.http_timeout)?),
        Arc::new(HeyGen::new(config.avatar_api_key.clone(), config.http_timeout)?),
        Arc::new(WeatherApi::new(config.weather_api_key.clone(), config.http_timeout)?),
        dispatcher,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await?;

    // The router (and with it every dispatcher clone) is gone; drain the queue.
    info!("draining background units");
    workers.shutdown().await;
    db_pool.close().await;
    Ok(())
}
