use anyhow::{Context, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

use open_jukebox::{
    audio::{stream::SubprocessStreamFactory, SessionRegistry, SessionSettings},
    bot::OpenJukebox,
    config::Config,
    sources::ResolutionRouter,
    storage::JsonStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Inicializar almacenamiento JSON
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    // Resolución de fuentes
    let router = Arc::new(ResolutionRouter::new(&config).context("No se pudo crear el cliente HTTP")?);
    if let Some(tokens) = router.spotify_tokens() {
        tokens.spawn_refresh_task();
        info!("🟢 Spotify habilitado");
    }

    // Motor de reproducción
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(SubprocessStreamFactory::from_config(&config)),
        storage.clone(),
        SessionSettings::from_config(&config),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let handler = OpenJukebox::new(config, storage, router, registry.clone());

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando sesiones...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Verifica que yt-dlp y ffmpeg estén disponibles
async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("No se pudo ejecutar {}", config.ytdlp_path.display()))?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await
        .with_context(|| format!("No se pudo ejecutar {}", config.ffmpeg_path.display()))?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
