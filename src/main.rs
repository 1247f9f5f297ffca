use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use sentrix::api::{self, AppState};
use sentrix::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    let state = sentrix::build_state(&cfg).await?;

    if cfg.redis_url.is_none() {
        spawn_janitor(state.clone(), cfg.janitor_interval());
    }

    let cors_origin = HeaderValue::from_str(&cfg.frontend_url)
        .context("FRONTEND_URL is not a valid header value")?;
    let app = api::router(state, cors_origin, cfg.upload_limit_bytes);

    let listen_addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    tracing::info!(%listen_addr, chain = ?cfg.chain.backend, "starting sentrix api");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("sentrix exited cleanly");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match std::env::var("SENTRIX_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

fn spawn_janitor(state: AppState, interval: Duration) {
    if interval.is_zero() {
        tracing::warn!("janitor interval disabled; expired nonces will linger");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.auth.purge_expired_nonces().await {
                Ok(purged) if purged > 0 => tracing::debug!(purged, "purged expired nonces"),
                Ok(_) => {}
                Err(error) => tracing::warn!(%error, "nonce purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
