use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tracing::warn;

use crate::audio::player::NotificationSink;
use crate::subsonic::{Catalog, Song};
use crate::ui::embeds;

/// Anunciador de eventos del player sobre un canal de texto de Discord.
///
/// Fire-and-forget: un fallo al enviar se loguea y nada más, el ciclo de
/// reproducción nunca depende de que el anuncio llegue.
pub struct ChannelSink {
    http: Arc<Http>,
    channel_id: ChannelId,
    catalog: Arc<dyn Catalog>,
}

impl ChannelSink {
    pub fn new(http: Arc<Http>, channel_id: ChannelId, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            http,
            channel_id,
            catalog,
        }
    }

    async fn send(&self, embed: CreateEmbed) {
        let message = CreateMessage::new().embed(embed);
        if let Err(err) = self.channel_id.send_message(&self.http, message).await {
            warn!("⚠️ No se pudo anunciar en el canal {}: {err}", self.channel_id);
        }
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn now_playing(&self, song: &Song) {
        let cover = song
            .cover_id
            .as_deref()
            .and_then(|id| self.catalog.cover_art_url(id));
        self.send(embeds::create_now_playing_embed(song, cover)).await;
    }

    async fn playback_ended(&self) {
        self.send(embeds::create_info_embed(
            "🎶 Cola Terminada",
            "No quedan canciones por reproducir.",
        ))
        .await;
    }

    async fn track_skipped(&self) {
        self.send(embeds::create_info_embed(
            "⏭️ Canción Saltada",
            "Pasando a la siguiente de la cola.",
        ))
        .await;
    }

    async fn playback_interrupted(&self, detail: &str) {
        warn!("anunciando interrupción de stream: {detail}");
        self.send(embeds::create_warning_embed(
            "La conexión de voz se interrumpió; intentando reconectar.",
        ))
        .await;
    }

    async fn playback_error(&self, message: &str) {
        self.send(embeds::create_error_embed(message)).await;
    }
}
