//! # Bot Module
//!
//! Main Discord bot implementation for Subsonica.
//!
//! This module contains the core bot logic, including:
//! - Slash command registration and handling
//! - Voice state tracking for idle disconnects
//! - Event handling (ready, interactions, voice state updates)
//!
//! ## Architecture
//!
//! The bot is built around the [`SubsonicaBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It routes every interaction to
//! [`handlers`] and feeds voice channel occupancy changes into the
//! [`PlayerRegistry`], which owns all playback state.

use std::sync::Arc;

use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::audio::registry::PlayerRegistry;
use crate::config::Config;
use crate::subsonic::Catalog;

/// Main Discord event handler for Subsonica.
///
/// Holds no playback state of its own: players live in the
/// [`PlayerRegistry`] and the media server is reached through the
/// [`Catalog`] trait.
pub struct SubsonicaBot {
    config: Arc<Config>,
    registry: Arc<PlayerRegistry>,
    catalog: Arc<dyn Catalog>,
}

impl SubsonicaBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            config,
            registry,
            catalog,
        }
    }

    /// Humanos presentes en el canal de voz del bot, según la caché.
    ///
    /// `None` si el bot no está en ningún canal de esa guild. Un miembro
    /// que no está en caché cuenta como humano.
    fn humans_in_bot_channel(ctx: &Context, guild_id: GuildId, bot_id: UserId) -> Option<usize> {
        let guild = ctx.cache.guild(guild_id)?;
        let bot_channel = guild
            .voice_states
            .get(&bot_id)
            .and_then(|state| state.channel_id)?;

        let humans = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(bot_channel))
            .filter(|state| state.user_id != bot_id)
            .filter(|state| {
                !guild
                    .members
                    .get(&state.user_id)
                    .map(|member| member.user.bot)
                    .unwrap_or(false)
            })
            .count();
        Some(humans)
    }
}

#[async_trait]
impl EventHandler for SubsonicaBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} conectado a Discord", ready.user.name);

        let result = match self.config.guild_id {
            Some(guild_id) => {
                info!("registrando comandos en la guild de desarrollo {guild_id}");
                commands::register_guild_commands(&ctx, guild_id).await
            }
            None => commands::register_global_commands(&ctx).await,
        };

        match result {
            Ok(()) => info!("✅ Comandos registrados"),
            Err(err) => error!("❌ Error registrando comandos: {err:#}"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(err) =
                handlers::handle_command(&ctx, &command, &self.registry, &self.catalog).await
            {
                error!("❌ Error manejando /{}: {err:#}", command.data.name);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        // el bot fue sacado del canal (kick manual o caída del servidor)
        if new.user_id == bot_id && new.channel_id.is_none() {
            warn!("🔌 Bot desconectado del canal de voz en guild {guild_id}");
            self.registry.remove(guild_id).await;
            return;
        }

        if let Some(humans) = Self::humans_in_bot_channel(&ctx, guild_id, bot_id) {
            self.registry.on_channel_occupancy_changed(guild_id, humans);
        }
    }
}
