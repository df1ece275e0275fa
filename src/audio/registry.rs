use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, Entry};
use serenity::model::id::GuildId;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info};

use crate::audio::player::Player;
use crate::audio::voice::VoiceTransport;
use crate::subsonic::Catalog;

/// Gracia por defecto antes de desconectar un canal sin humanos.
pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(10);

/// Registro de players, uno por guild.
///
/// El mapa es la única fuente de verdad: mientras una guild esté en el
/// registro su player es siempre la misma instancia, y al eliminarla la
/// próxima interacción recibe una instancia nueva con estado limpio.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<Player>>,
    /// Temporizadores de gracia armados, por guild.
    idle_watch: DashMap<GuildId, JoinHandle<()>>,
    transport: Arc<dyn VoiceTransport>,
    catalog: Arc<dyn Catalog>,
    idle_grace: Duration,
}

impl PlayerRegistry {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        catalog: Arc<dyn Catalog>,
        idle_grace: Duration,
    ) -> Self {
        Self {
            players: DashMap::new(),
            idle_watch: DashMap::new(),
            transport,
            catalog,
            idle_grace,
        }
    }

    /// El player de la guild, creándolo si no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Player> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Player nuevo para guild {guild_id}");
                Arc::new(Player::new(
                    guild_id,
                    self.transport.clone(),
                    self.catalog.clone(),
                ))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|p| p.clone())
    }

    /// Teardown completo de la guild: player, sesión de voz y timers.
    pub async fn remove(&self, guild_id: GuildId) {
        if let Some((_, watch)) = self.idle_watch.remove(&guild_id) {
            watch.abort();
        }
        if let Some((_, player)) = self.players.remove(&guild_id) {
            player.reset().await;
            self.transport.disconnect(guild_id).await;
            info!("🗑️ Player de guild {guild_id} eliminado");
        }
    }

    /// Reacciona a los cambios de ocupación del canal de voz del bot.
    ///
    /// Sin humanos presentes se arma un temporizador de gracia; si alguien
    /// vuelve antes de que expire, el temporizador se cancela y la
    /// reproducción sigue intacta.
    pub fn on_channel_occupancy_changed(self: &Arc<Self>, guild_id: GuildId, humans_present: usize) {
        if humans_present > 0 {
            if let Some((_, watch)) = self.idle_watch.remove(&guild_id) {
                watch.abort();
                debug!("⏳ Gracia cancelada en guild {guild_id}, volvió alguien");
            }
            return;
        }

        if !self.players.contains_key(&guild_id) {
            return;
        }

        // armar vía entry: dos eventos concurrentes de ocupación cero no
        // pueden dejar un segundo timer sin handle que abortar
        let Entry::Vacant(slot) = self.idle_watch.entry(guild_id) else {
            return;
        };

        info!(
            "👻 Canal sin humanos en guild {guild_id}, desconexión en {}s",
            self.idle_grace.as_secs()
        );
        let registry = Arc::clone(self);
        let grace = self.idle_grace;
        slot.insert(tokio::spawn(async move {
            time::sleep(grace).await;
            info!("👋 Gracia expirada en guild {guild_id}, desconectando");
            // quitar el propio handle antes del teardown, para que
            // `remove` no aborte esta misma tarea a mitad de la limpieza
            registry.idle_watch.remove(&guild_id);
            registry.remove(guild_id).await;
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice::MockVoiceTransport;
    use crate::subsonic::{MockCatalog, Song};
    use pretty_assertions::assert_eq;

    fn song(id: &str) -> Song {
        Song {
            id: id.to_string(),
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            duration: 60,
            cover_id: None,
        }
    }

    fn registry_with(transport: MockVoiceTransport) -> Arc<PlayerRegistry> {
        Arc::new(PlayerRegistry::new(
            Arc::new(transport),
            Arc::new(MockCatalog::new()),
            DEFAULT_IDLE_GRACE,
        ))
    }

    #[test]
    fn get_or_create_returns_the_same_instance_per_guild() {
        let registry = registry_with(MockVoiceTransport::new());
        let first = registry.get_or_create(GuildId::new(1));
        let second = registry.get_or_create(GuildId::new(1));
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry.get_or_create(GuildId::new(2));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn players_of_different_guilds_never_share_state() {
        let registry = registry_with(MockVoiceTransport::new());
        let first = registry.get_or_create(GuildId::new(1));
        let second = registry.get_or_create(GuildId::new(2));

        first.enqueue(song("only-in-one"));
        first.set_autoplay_mode(crate::audio::autoplay::AutoplayMode::Similar);

        assert!(second.queue_is_empty());
        assert_eq!(
            second.autoplay_mode(),
            crate::audio::autoplay::AutoplayMode::None
        );
        let (_, queue) = first.playback_snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_tears_down_after_the_grace_period() {
        let mut transport = MockVoiceTransport::new();
        transport.expect_stop().returning(|_| ());
        transport.expect_disconnect().times(1).returning(|_| ());

        let registry = registry_with(transport);
        let guild = GuildId::new(1);
        registry.get_or_create(guild);

        registry.on_channel_occupancy_changed(guild, 0);
        time::sleep(Duration::from_secs(11)).await;

        assert!(registry.get(guild).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn someone_returning_within_the_grace_cancels_the_teardown() {
        // sin expect_disconnect: cualquier desconexión haría fallar el test
        let registry = registry_with(MockVoiceTransport::new());
        let guild = GuildId::new(1);
        let player = registry.get_or_create(guild);
        player.enqueue(song("a"));

        registry.on_channel_occupancy_changed(guild, 0);
        time::sleep(Duration::from_secs(9)).await;
        registry.on_channel_occupancy_changed(guild, 1);
        time::sleep(Duration::from_secs(30)).await;

        let survivor = registry.get(guild).expect("player intacto");
        assert!(Arc::ptr_eq(&player, &survivor));
        let (_, queue) = survivor.playback_snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_duplicate_zero_occupancy_event_does_not_defeat_the_abort() {
        // sin expect_disconnect: cualquier timer que sobreviva al abort
        // haría fallar el test al expirar
        let registry = registry_with(MockVoiceTransport::new());
        let guild = GuildId::new(1);
        let player = registry.get_or_create(guild);

        registry.on_channel_occupancy_changed(guild, 0);
        time::sleep(Duration::from_secs(5)).await;
        registry.on_channel_occupancy_changed(guild, 0);
        time::sleep(Duration::from_secs(4)).await;
        registry.on_channel_occupancy_changed(guild, 1);
        time::sleep(Duration::from_secs(30)).await;

        let survivor = registry.get(guild).expect("player intacto");
        assert!(Arc::ptr_eq(&player, &survivor));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_affects_only_the_idle_guild() {
        let mut transport = MockVoiceTransport::new();
        transport.expect_stop().returning(|_| ());
        transport.expect_disconnect().times(1).returning(|_| ());

        let registry = registry_with(transport);
        let idle = GuildId::new(1);
        let busy = GuildId::new(2);
        registry.get_or_create(idle);
        let busy_player = registry.get_or_create(busy);
        busy_player.enqueue(song("b"));

        registry.on_channel_occupancy_changed(idle, 0);
        time::sleep(Duration::from_secs(11)).await;

        assert!(registry.get(idle).is_none());
        let survivor = registry.get(busy).expect("la otra guild no se toca");
        let (_, queue) = survivor.playback_snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn removal_yields_a_fresh_player_on_the_next_interaction() {
        let mut transport = MockVoiceTransport::new();
        transport.expect_stop().returning(|_| ());
        transport.expect_disconnect().returning(|_| ());

        let registry = registry_with(transport);
        let guild = GuildId::new(1);
        let stale = registry.get_or_create(guild);
        stale.enqueue(song("x"));

        registry.remove(guild).await;

        let fresh = registry.get_or_create(guild);
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.queue_is_empty());
        assert!(!fresh.has_session());
    }
}
