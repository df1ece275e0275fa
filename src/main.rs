use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod subsonic;
mod ui;

use crate::audio::registry::PlayerRegistry;
use crate::audio::transport::SongbirdTransport;
use crate::audio::voice::VoiceTransport;
use crate::bot::SubsonicaBot;
use crate::config::Config;
use crate::subsonic::{Catalog, SubsonicClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("subsonica=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Subsonica v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    // Cliente del servidor de música
    let catalog: Arc<dyn Catalog> = Arc::new(SubsonicClient::new(
        &config.subsonic_url,
        &config.subsonic_user,
        &config.subsonic_password,
    )?);
    info!("🎧 Catálogo Subsonic en {}", config.subsonic_url);

    // El manager de songbird se comparte entre serenity y el transporte
    let manager = Songbird::serenity();
    let transport: Arc<dyn VoiceTransport> = Arc::new(SongbirdTransport::new(manager.clone()));

    let registry = Arc::new(PlayerRegistry::new(
        transport,
        catalog.clone(),
        Duration::from_secs(config.idle_grace_secs),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = SubsonicaBot::new(config.clone(), registry, catalog);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
