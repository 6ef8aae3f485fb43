//! speakd daemon: HTTP front end for the synthesis engine.

use speakd_core::Synthesizer;
use speakd_daemon::{build_app, AppState, DaemonConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,speakd_core=info,speakd_daemon=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let config = DaemonConfig::from_env()?;
    info!(
        bind = %config.bind,
        engine = ?config.engine.program,
        working_dir = ?config.engine.working_dir,
        timeout_ms = config.engine.timeout_ms,
        rate_limit = config.rate_limit.max_requests,
        rate_window_secs = config.rate_limit.window_secs,
        "starting speakd daemon"
    );

    let app = build_app(AppState::with_rate_limit(
        Synthesizer::new(config.engine),
        config.rate_limit,
    ));
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("speakd daemon listening on http://{}", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
