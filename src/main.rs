use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

#[cfg(test)]
mod testing;

use crate::audio::{
    downloader::DownloadCoordinator, player::PlaybackDriver, reaper::IdleReaper,
    voice::SongbirdConnector,
};
use crate::bot::{service::MusicService, BnssBot};
use crate::config::Config;
use crate::sources::YtDlpResolver;

fn main() -> Result<()> {
    let config = Config::load()?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("bnss={}", config.log_level.as_str().to_lowercase()).parse()?)
                .add_directive("serenity=warn".parse()?)
                .add_directive("songbird=warn".parse()?),
        )
        .init();

    info!("🎵 Iniciando bnss v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", config.summary());

    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone())?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let version = resolver.version().await?;
        println!("OK (yt-dlp {})", version);
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    let manager = Songbird::serenity();
    let connector = Arc::new(SongbirdConnector::new(manager.clone()));
    let (driver, events) = PlaybackDriver::new(connector, config.player_settings());
    let coordinator = DownloadCoordinator::new(resolver, driver.clone(), config.policy());

    tokio::spawn(driver.clone().run_events(events, shutdown.clone()));
    coordinator.spawn_ticker(config.download_tick, shutdown.clone());
    IdleReaper::new(driver.clone()).spawn(config.idle_sweep, shutdown.clone());
    info!("🧹 Tareas de fondo iniciadas");

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let config = Arc::new(config);
    let service = Arc::new(MusicService::new(driver, coordinator));
    let handler = BnssBot::new(config.clone(), service);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
