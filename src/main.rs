use anyhow::anyhow;
use axum::Router;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden::app::engine::QuotaEngine;
use warden::config::engine::{EngineSettings, ListenerSettings};
use warden::config::AppConfig;
use warden::infra::{db::Db, discord::DiscordClient, ledger::PgLedger};
use warden::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    db.migrate().await?;
    let ledger = Arc::new(PgLedger::new(db));

    let discord = Arc::new(DiscordClient::new(&config)?);
    let engine_member_id = discord
        .current_user_id()
        .await
        .map_err(|err| anyhow!("failed to identify the bot account: {}", err))?;
    tracing::info!(engine_member_id, guild_id = config.guild_id, "platform account resolved");

    let settings = EngineSettings::from_config(&config).with_engine_member(engine_member_id);
    let engine = QuotaEngine::new(ledger, discord.clone(), discord.clone(), settings);

    let listener = jobs::audit_listener::run(
        engine.clone(),
        discord.clone(),
        ListenerSettings::from_config(&config),
    );
    let maintenance = jobs::maintenance::run(
        engine.clone(),
        Duration::from_secs(config.maintenance_interval_seconds),
    );

    match config.app_mode.as_str() {
        "api" => {
            let state = AppState {
                engine,
                admin_token: config.admin_token.clone(),
            };
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let tcp = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            let server = axum::serve(tcp, app)
                .with_graceful_shutdown(shutdown_signal())
                .into_future();
            tokio::select! {
                result = server => result?,
                result = listener => result?,
                result = maintenance => result?,
            }
        }
        "worker" => {
            tracing::info!("starting worker mode");
            tokio::select! {
                result = listener => result?,
                result = maintenance => result?,
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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
