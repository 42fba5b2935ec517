use quiz_creator::{build_state, config::ServerConfig, routes::build_router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = ServerConfig::from_env();
    let state = build_state(&config);
    if let Some(path) = &config.local_state_path {
        let count = state.db.quizzes.read().await.len();
        tracing::info!("loaded {} quizzes from {}", count, path);
    }
    let app = build_router(state, &config);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("quiz service listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
