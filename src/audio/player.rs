use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::audio::autoplay::{select_autoplay, AutoplayMode};
use crate::audio::queue::SongQueue;
use crate::audio::voice::{StreamOutcome, VoiceConnectionManager, VoiceTransport};
use crate::error::VoiceError;
use crate::subsonic::{Catalog, Song};

/// Intentos de arranque de un stream antes de rendirse.
const STREAM_START_ATTEMPTS: u8 = 3;
/// Espera fija entre intentos de arranque.
const STREAM_START_BACKOFF: Duration = Duration::from_secs(1);
/// Búsquedas de autoplay consecutivas sin una reproducción completada.
/// Corta el ciclo si el catálogo oscila entre vacío y no-reproducible.
const AUTOPLAY_CHAIN_CAP: u8 = 3;

/// Estado de reproducción de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Retrying,
    Stopped,
}

/// Sesión de voz viva. Ausente cuando la guild está desconectada.
#[derive(Debug, Clone)]
pub struct VoiceSession {
    pub channel_id: ChannelId,
}

/// Eventos de ciclo de vida que el player anuncia (al canal de texto de
/// la guild, en producción). El player no sabe de embeds ni de Discord.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn now_playing(&self, song: &Song);
    async fn playback_ended(&self);
    async fn track_skipped(&self);
    async fn playback_interrupted(&self, detail: &str);
    async fn playback_error(&self, message: &str);
}

/// El player de una guild: cola, canción actual y máquina de estados.
///
/// Cada instancia posee estado propio recién asignado; nada se comparte
/// entre guilds. Toda mutación de cola/actual/estado pasa por los locks
/// de esta instancia, y el ciclo de avance es single-flight: dos llamadas
/// concurrentes a `run_advance` producen exactamente un stream activo.
///
/// La posición de reproducción vive en el transporte: aquí no se guarda
/// un offset porque ninguna operación reanuda a mitad de track.
pub struct Player {
    guild_id: GuildId,
    queue: Mutex<SongQueue>,
    current: Mutex<Option<Song>>,
    state: Mutex<PlayerState>,
    session: Mutex<Option<VoiceSession>>,
    autoplay_mode: Mutex<AutoplayMode>,
    stop_requested: AtomicBool,
    /// Candado del ciclo de avance; `try_lock` fallido significa que ya
    /// hay un ciclo en curso y la llamada es un no-op.
    advance_gate: AsyncMutex<()>,
    sink: RwLock<Option<Arc<dyn NotificationSink>>>,
    transport: Arc<dyn VoiceTransport>,
    catalog: Arc<dyn Catalog>,
    voice: VoiceConnectionManager,
}

impl Player {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            guild_id,
            queue: Mutex::new(SongQueue::new()),
            current: Mutex::new(None),
            state: Mutex::new(PlayerState::Idle),
            session: Mutex::new(None),
            autoplay_mode: Mutex::new(AutoplayMode::None),
            stop_requested: AtomicBool::new(false),
            advance_gate: AsyncMutex::new(()),
            sink: RwLock::new(None),
            voice: VoiceConnectionManager::new(transport.clone()),
            transport,
            catalog,
        }
    }

    /// Canal de anuncios; el último comando que tocó al player lo fija.
    pub fn set_sink(&self, sink: Arc<dyn NotificationSink>) {
        *self.sink.write() = Some(sink);
    }

    fn sink(&self) -> Option<Arc<dyn NotificationSink>> {
        self.sink.read().clone()
    }

    pub fn autoplay_mode(&self) -> AutoplayMode {
        *self.autoplay_mode.lock()
    }

    pub fn set_autoplay_mode(&self, mode: AutoplayMode) {
        *self.autoplay_mode.lock() = mode;
        info!("🎛️ Autoplay de guild {} ahora es {:?}", self.guild_id, mode);
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn enqueue(&self, song: Song) {
        self.queue.lock().enqueue(song);
    }

    pub fn enqueue_many(&self, songs: Vec<Song>) {
        self.queue.lock().enqueue_many(songs);
    }

    pub fn clear_queue(&self) {
        self.queue.lock().clear();
    }

    pub fn shuffle_queue(&self) {
        self.queue.lock().shuffle();
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Canción actual y vista de la cola, para `/queue`.
    pub fn playback_snapshot(&self) -> (Option<Song>, Vec<Song>) {
        (self.current.lock().clone(), self.queue.lock().snapshot())
    }

    /// Abre la sesión de voz de la guild, con los reintentos del gestor.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<(), VoiceError> {
        *self.state.lock() = PlayerState::Connecting;
        match self.voice.connect_with_retry(self.guild_id, channel_id).await {
            Ok(()) => {
                *self.session.lock() = Some(VoiceSession { channel_id });
                *self.state.lock() = PlayerState::Idle;
                Ok(())
            }
            Err(err) => {
                *self.session.lock() = None;
                *self.state.lock() = PlayerState::Idle;
                Err(err)
            }
        }
    }

    pub async fn is_streaming(&self) -> bool {
        self.transport.is_streaming(self.guild_id).await
    }

    /// Dispara un ciclo de avance en segundo plano.
    pub fn trigger_advance(self: &Arc<Self>) {
        let player = Arc::clone(self);
        tokio::spawn(async move { player.run_advance().await });
    }

    /// El ciclo de avance: reproduce la cola hasta vaciarla.
    ///
    /// Idempotente y single-flight: si ya hay un ciclo activo o el
    /// transporte está entregando audio, la llamada es un no-op. Cada
    /// iteración extrae la primera canción, la entrega y espera su
    /// resultado único; la finalización de un track es lo que evalúa el
    /// siguiente, de modo que las finalizaciones de una guild son
    /// estrictamente secuenciales.
    pub async fn run_advance(self: Arc<Self>) {
        let _gate = match self.advance_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                debug!("avance ya en curso en guild {}, no-op", self.guild_id);
                return;
            }
        };

        if self.transport.is_streaming(self.guild_id).await {
            debug!("el transporte ya está entregando audio en guild {}", self.guild_id);
            return;
        }

        if !self.has_session() {
            // Violación de invariante: avanzar sin sesión de voz. Se
            // contiene y se auto-repara, nunca se propaga.
            warn!("⚠️ advance sin sesión de voz en guild {}, reseteando a Idle", self.guild_id);
            *self.state.lock() = PlayerState::Idle;
            return;
        }

        // Un advance explícito es el rearranque tras un stop
        self.stop_requested.store(false, Ordering::SeqCst);
        let mut autoplay_chain: u8 = 0;

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                *self.state.lock() = PlayerState::Stopped;
                debug!("stop solicitado en guild {}, ciclo terminado", self.guild_id);
                return;
            }

            let next = self.queue.lock().pop_front();
            let Some(song) = next else {
                if self.handle_empty_queue(&mut autoplay_chain).await {
                    continue;
                }
                return;
            };

            *self.current.lock() = Some(song.clone());
            if let Some(sink) = self.sink() {
                sink.now_playing(&song).await;
            }

            let done = match self.stream_song(&song).await {
                Ok(done) => done,
                Err(err) => {
                    error!("❌ No se pudo iniciar el stream en guild {}: {err:#}", self.guild_id);
                    if let Some(sink) = self.sink() {
                        sink.playback_error("Failed to play audio after multiple attempts.")
                            .await;
                    }
                    *self.current.lock() = None;
                    *self.state.lock() = PlayerState::Idle;
                    return;
                }
            };

            *self.state.lock() = PlayerState::Streaming;

            match done.await {
                Ok(StreamOutcome::Failed(detail)) => {
                    if !self.recover_from_interruption(&detail).await {
                        return;
                    }
                    autoplay_chain = 0;
                }
                // Emisor descartado equivale a un stream detenido
                Ok(StreamOutcome::Finished) | Err(_) => {
                    debug!("🎵 Track terminado en guild {}", self.guild_id);
                    *self.state.lock() = PlayerState::Idle;
                    autoplay_chain = 0;
                }
            }
        }
    }

    /// Cola vacía: intenta autoplay. Devuelve true si el ciclo debe
    /// seguir (se encoló algo), false si la reproducción terminó.
    async fn handle_empty_queue(&self, autoplay_chain: &mut u8) -> bool {
        let mode = self.autoplay_mode();
        let previous_id = self.current.lock().take().map(|song| song.id);

        if mode == AutoplayMode::None {
            self.finish_playback().await;
            return false;
        }

        if *autoplay_chain >= AUTOPLAY_CHAIN_CAP {
            warn!(
                "⚠️ Autoplay encadenó {AUTOPLAY_CHAIN_CAP} búsquedas sin reproducir en guild {}, cortando",
                self.guild_id
            );
            self.finish_playback().await;
            return false;
        }
        *autoplay_chain += 1;

        match select_autoplay(self.catalog.as_ref(), mode, previous_id.as_deref()).await {
            Ok(songs) if songs.is_empty() => {
                debug!("autoplay sin candidatos en guild {}", self.guild_id);
                self.finish_playback().await;
                false
            }
            Ok(songs) => {
                // Autoplay sólo inserta en una cola vacía
                self.queue.lock().enqueue_many(songs);
                true
            }
            Err(err) => {
                error!("❌ Error de catálogo en autoplay de guild {}: {err}", self.guild_id);
                if let Some(sink) = self.sink() {
                    sink.playback_error("The music service returned an error.").await;
                }
                *self.state.lock() = PlayerState::Idle;
                false
            }
        }
    }

    async fn finish_playback(&self) {
        info!("📭 Cola vacía en guild {}, reproducción terminada", self.guild_id);
        if let Some(sink) = self.sink() {
            sink.playback_ended().await;
        }
        *self.state.lock() = PlayerState::Idle;
    }

    /// Pérdida transitoria a mitad de stream: reconecta y sigue con la
    /// cola. El track interrumpido se descarta y se avanza al siguiente;
    /// la interrupción se anuncia en vez de reanudarlo.
    async fn recover_from_interruption(&self, detail: &str) -> bool {
        warn!("🔌 Stream interrumpido en guild {}: {detail}", self.guild_id);
        *self.state.lock() = PlayerState::Retrying;
        if let Some(sink) = self.sink() {
            sink.playback_interrupted(detail).await;
        }

        let channel_id = match self.session.lock().as_ref() {
            Some(session) => session.channel_id,
            None => {
                // el track interrumpido ya no suena, no puede quedar como actual
                *self.current.lock() = None;
                *self.state.lock() = PlayerState::Idle;
                return false;
            }
        };

        match self.voice.connect_with_retry(self.guild_id, channel_id).await {
            Ok(()) => {
                *self.state.lock() = PlayerState::Idle;
                true
            }
            Err(err) => {
                error!("❌ No se pudo recuperar la sesión de voz en guild {}: {err}", self.guild_id);
                if let Some(sink) = self.sink() {
                    sink.playback_error("Voice connection was lost and could not be recovered.")
                        .await;
                }
                *self.current.lock() = None;
                *self.session.lock() = None;
                *self.state.lock() = PlayerState::Idle;
                false
            }
        }
    }

    /// Resuelve la URL de streaming y arranca la entrega, con reintentos
    /// acotados y espera fija entre ellos.
    async fn stream_song(&self, song: &Song) -> Result<oneshot::Receiver<StreamOutcome>> {
        let url = self.catalog.resolve_stream_url(&song.id).await?;

        let mut last_err = VoiceError::NotConnected;
        for attempt in 1..=STREAM_START_ATTEMPTS {
            match self.transport.start_stream(self.guild_id, &url).await {
                Ok(done) => {
                    info!("▶️ Reproduciendo: {} - {}", song.title, song.artist);
                    return Ok(done);
                }
                Err(err) => {
                    warn!(
                        "⚠️ Intento {attempt}/{STREAM_START_ATTEMPTS} de arranque falló en guild {}: {err}",
                        self.guild_id
                    );
                    last_err = err;
                    if attempt < STREAM_START_ATTEMPTS {
                        time::sleep(STREAM_START_BACKOFF).await;
                    }
                }
            }
        }
        Err(last_err.into())
    }

    /// Salta el track actual. El transporte dispara la finalización y el
    /// ciclo de avance en curso continúa con la cola.
    pub async fn skip(&self) -> bool {
        if !self.transport.is_streaming(self.guild_id).await {
            return false;
        }
        info!("⏭️ Saltando track en guild {}", self.guild_id);
        self.transport.stop(self.guild_id).await;
        if let Some(sink) = self.sink() {
            sink.track_skipped().await;
        }
        true
    }

    /// Detiene la reproducción. La cola queda intacta; hace falta un
    /// advance explícito para rearrancar.
    pub async fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.transport.stop(self.guild_id).await;
        *self.current.lock() = None;
        *self.state.lock() = PlayerState::Stopped;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    /// Teardown por inactividad o desconexión: cola y actual se limpian
    /// y la sesión se libera.
    pub async fn reset(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.transport.stop(self.guild_id).await;
        self.queue.lock().clear();
        *self.current.lock() = None;
        *self.session.lock() = None;
        *self.state.lock() = PlayerState::Idle;
        info!("🧹 Player de guild {} reseteado", self.guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice::MockVoiceTransport;
    use crate::subsonic::{ApiError, MockCatalog};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn song(id: &str) -> Song {
        Song {
            id: id.to_string(),
            title: format!("title-{id}"),
            artist: "artist".into(),
            album: "album".into(),
            duration: 120,
            cover_id: None,
        }
    }

    /// Sink que registra los eventos en orden, para aserciones de guion.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn now_playing(&self, song: &Song) {
            self.events.lock().push(format!("now_playing:{}", song.id));
        }
        async fn playback_ended(&self) {
            self.events.lock().push("ended".into());
        }
        async fn track_skipped(&self) {
            self.events.lock().push("skipped".into());
        }
        async fn playback_interrupted(&self, _detail: &str) {
            self.events.lock().push("interrupted".into());
        }
        async fn playback_error(&self, message: &str) {
            self.events.lock().push(format!("error:{message}"));
        }
    }

    fn resolve_urls(catalog: &mut MockCatalog) {
        catalog
            .expect_resolve_stream_url()
            .returning(|id| Ok(format!("http://music.local/rest/stream?id={id}")));
    }

    fn allow_connect(transport: &mut MockVoiceTransport) {
        transport.expect_connect().returning(|_, _, _| Ok(()));
        transport.expect_wait_ready().returning(|_, _| Ok(()));
    }

    fn finished_stream() -> oneshot::Receiver<StreamOutcome> {
        let (tx, rx) = oneshot::channel();
        tx.send(StreamOutcome::Finished).unwrap();
        rx
    }

    async fn connected_player(
        transport: MockVoiceTransport,
        catalog: MockCatalog,
    ) -> (Arc<Player>, Arc<RecordingSink>) {
        let player = Arc::new(Player::new(
            GuildId::new(7),
            Arc::new(transport),
            Arc::new(catalog),
        ));
        let sink = Arc::new(RecordingSink::default());
        player.set_sink(sink.clone());
        player.connect(ChannelId::new(42)).await.unwrap();
        (player, sink)
    }

    #[tokio::test]
    async fn plays_the_queue_in_fifo_order_and_announces_the_end() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);
        transport
            .expect_start_stream()
            .times(2)
            .returning(|_, _| Ok(finished_stream()));

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue(song("a"));
        player.enqueue(song("b"));

        player.clone().run_advance().await;

        assert_eq!(
            sink.events(),
            vec!["now_playing:a", "now_playing:b", "ended"]
        );
        assert_eq!(player.state(), PlayerState::Idle);
        let (current, queue) = player.playback_snapshot();
        assert_eq!(current, None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn empty_queue_without_autoplay_only_announces_the_end() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);

        // el catálogo no debe recibir ninguna llamada
        let catalog = MockCatalog::new();

        let (player, sink) = connected_player(transport, catalog).await;
        player.clone().run_advance().await;

        assert_eq!(sink.events(), vec!["ended"]);
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[tokio::test]
    async fn similar_autoplay_looks_up_exactly_the_previous_song() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);
        transport
            .expect_start_stream()
            .returning(|_, _| Ok(finished_stream()));

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);
        let lookups: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = lookups.clone();
        catalog
            .expect_get_similar_songs()
            .returning(move |id, _count| {
                recorded.lock().push(id.to_string());
                if id == "x" {
                    Ok(vec![song("y")])
                } else {
                    Ok(Vec::new())
                }
            });

        let (player, sink) = connected_player(transport, catalog).await;
        player.set_autoplay_mode(AutoplayMode::Similar);
        player.enqueue(song("x"));

        player.clone().run_advance().await;

        assert_eq!(*lookups.lock(), vec!["x", "y"]);
        assert_eq!(
            sink.events(),
            vec!["now_playing:x", "now_playing:y", "ended"]
        );
    }

    #[tokio::test]
    async fn autoplay_never_fires_while_the_queue_is_non_empty() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);
        transport
            .expect_start_stream()
            .returning(|_, _| Ok(finished_stream()));

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);
        // Random sólo puede consultarse una vez, con la cola ya vacía
        catalog
            .expect_get_random_songs()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let (player, _sink) = connected_player(transport, catalog).await;
        player.set_autoplay_mode(AutoplayMode::Random);
        player.enqueue_many(vec![song("a"), song("b"), song("c")]);

        player.clone().run_advance().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_advances_produce_exactly_one_active_stream() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);

        let starts = Arc::new(AtomicUsize::new(0));
        let pending: Arc<Mutex<Option<oneshot::Sender<StreamOutcome>>>> =
            Arc::new(Mutex::new(None));
        let starts_in_mock = starts.clone();
        let pending_in_mock = pending.clone();
        transport.expect_start_stream().returning(move |_, _| {
            starts_in_mock.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            *pending_in_mock.lock() = Some(tx);
            Ok(rx)
        });

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue(song("a"));

        let first = tokio::spawn(player.clone().run_advance());
        time::sleep(Duration::from_millis(10)).await;

        // segundo advance concurrente: el candado lo convierte en no-op
        player.clone().run_advance().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        // destrabar el primer ciclo y dejarlo terminar
        pending.lock().take().unwrap().send(StreamOutcome::Finished).unwrap();
        first.await.unwrap();
        assert_eq!(sink.events(), vec!["now_playing:a", "ended"]);
    }

    #[tokio::test]
    async fn advance_is_a_noop_while_the_transport_reports_streaming() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| true);

        let catalog = MockCatalog::new();
        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue(song("a"));

        player.clone().run_advance().await;

        assert!(sink.events().is_empty());
        let (_, queue) = player.playback_snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_mid_stream_loss_drops_the_track_and_advances() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);

        let starts = AtomicUsize::new(0);
        transport.expect_start_stream().returning(move |_, _| {
            let (tx, rx) = oneshot::channel();
            if starts.fetch_add(1, Ordering::SeqCst) == 0 {
                tx.send(StreamOutcome::Failed("connection reset".into())).unwrap();
            } else {
                tx.send(StreamOutcome::Finished).unwrap();
            }
            Ok(rx)
        });

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue_many(vec![song("a"), song("b")]);

        player.clone().run_advance().await;

        assert_eq!(
            sink.events(),
            vec!["now_playing:a", "interrupted", "now_playing:b", "ended"]
        );
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recovery_clears_the_interrupted_song() {
        let mut transport = MockVoiceTransport::new();
        transport.expect_is_streaming().returning(|_| false);
        transport.expect_wait_ready().returning(|_, _| Ok(()));

        // la conexión inicial funciona; la reconexión es un fallo fatal
        let connects = AtomicUsize::new(0);
        transport.expect_connect().returning(move |_, _, _| {
            if connects.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(VoiceError::MissingPermissions)
            }
        });

        transport.expect_start_stream().returning(|_, _| {
            let (tx, rx) = oneshot::channel();
            tx.send(StreamOutcome::Failed("connection reset".into())).unwrap();
            Ok(rx)
        });

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue(song("a"));

        player.clone().run_advance().await;

        // nada suena y no hay sesión: la interrumpida no puede seguir
        // reportándose como actual
        let (current, _) = player.playback_snapshot();
        assert_eq!(current, None);
        assert!(!player.has_session());
        assert_eq!(player.state(), PlayerState::Idle);

        let events = sink.events();
        assert_eq!(events[0], "now_playing:a");
        assert_eq!(events[1], "interrupted");
        assert!(events[2].starts_with("error:"));
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_gives_up_after_three_attempts() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);
        transport
            .expect_start_stream()
            .times(3)
            .returning(|_, _| Err(VoiceError::Driver("opus stream rejected".into())));

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue(song("a"));

        player.clone().run_advance().await;

        let events = sink.events();
        assert_eq!(events[0], "now_playing:a");
        assert!(events[1].starts_with("error:"));
        assert_eq!(player.state(), PlayerState::Idle);
        let (current, _) = player.playback_snapshot();
        assert_eq!(current, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_playback_but_keeps_the_queue() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);

        let pending: Arc<Mutex<Option<oneshot::Sender<StreamOutcome>>>> =
            Arc::new(Mutex::new(None));
        let pending_in_start = pending.clone();
        transport.expect_start_stream().returning(move |_, _| {
            let (tx, rx) = oneshot::channel();
            *pending_in_start.lock() = Some(tx);
            Ok(rx)
        });
        let pending_in_stop = pending.clone();
        transport.expect_stop().returning(move |_| {
            if let Some(tx) = pending_in_stop.lock().take() {
                let _ = tx.send(StreamOutcome::Finished);
            }
        });

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue_many(vec![song("a"), song("b")]);

        let cycle = tokio::spawn(player.clone().run_advance());
        time::sleep(Duration::from_millis(10)).await;

        player.stop().await;
        cycle.await.unwrap();

        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(sink.events(), vec!["now_playing:a"]);
        let (current, queue) = player.playback_snapshot();
        assert_eq!(current, None);
        assert_eq!(queue.len(), 1, "la cola queda intacta tras stop");
    }

    #[tokio::test(start_paused = true)]
    async fn skip_stops_the_current_track_and_the_cycle_continues() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);

        let streaming = Arc::new(AtomicBool::new(false));
        let streaming_in_check = streaming.clone();
        transport
            .expect_is_streaming()
            .returning(move |_| streaming_in_check.load(Ordering::SeqCst));

        let pending: Arc<Mutex<Option<oneshot::Sender<StreamOutcome>>>> =
            Arc::new(Mutex::new(None));
        let starts = AtomicUsize::new(0);
        let pending_in_start = pending.clone();
        let streaming_in_start = streaming.clone();
        transport.expect_start_stream().returning(move |_, _| {
            let (tx, rx) = oneshot::channel();
            if starts.fetch_add(1, Ordering::SeqCst) == 0 {
                streaming_in_start.store(true, Ordering::SeqCst);
                *pending_in_start.lock() = Some(tx);
            } else {
                tx.send(StreamOutcome::Finished).unwrap();
            }
            Ok(rx)
        });
        let pending_in_stop = pending.clone();
        let streaming_in_stop = streaming.clone();
        transport.expect_stop().returning(move |_| {
            streaming_in_stop.store(false, Ordering::SeqCst);
            if let Some(tx) = pending_in_stop.lock().take() {
                let _ = tx.send(StreamOutcome::Finished);
            }
        });

        let mut catalog = MockCatalog::new();
        resolve_urls(&mut catalog);

        let (player, sink) = connected_player(transport, catalog).await;
        player.enqueue_many(vec![song("a"), song("b")]);

        let cycle = tokio::spawn(player.clone().run_advance());
        time::sleep(Duration::from_millis(10)).await;

        assert!(player.skip().await);
        cycle.await.unwrap();

        assert_eq!(
            sink.events(),
            vec!["now_playing:a", "skipped", "now_playing:b", "ended"]
        );
    }

    #[tokio::test]
    async fn advance_without_a_session_self_heals_to_idle() {
        let mut transport = MockVoiceTransport::new();
        transport.expect_is_streaming().returning(|_| false);
        let catalog = MockCatalog::new();

        let player = Arc::new(Player::new(
            GuildId::new(7),
            Arc::new(transport),
            Arc::new(catalog),
        ));
        let sink = Arc::new(RecordingSink::default());
        player.set_sink(sink.clone());
        player.enqueue(song("a"));

        player.clone().run_advance().await;

        assert_eq!(player.state(), PlayerState::Idle);
        assert!(sink.events().is_empty());
        let (_, queue) = player.playback_snapshot();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn autoplay_catalog_error_is_surfaced_as_a_generic_service_error() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_is_streaming().returning(|_| false);

        let mut catalog = MockCatalog::new();
        catalog.expect_get_random_songs().returning(|_| {
            Err(ApiError::Api {
                code: 50,
                message: "internal secret detail".into(),
            })
        });

        let (player, sink) = connected_player(transport, catalog).await;
        player.set_autoplay_mode(AutoplayMode::Random);

        player.clone().run_advance().await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("error:"));
        assert!(!events[0].contains("internal secret detail"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_queue_current_and_session() {
        let mut transport = MockVoiceTransport::new();
        allow_connect(&mut transport);
        transport.expect_stop().returning(|_| ());

        let catalog = MockCatalog::new();
        let (player, _sink) = connected_player(transport, catalog).await;
        player.enqueue_many(vec![song("a"), song("b")]);

        player.reset().await;

        assert!(!player.has_session());
        assert_eq!(player.state(), PlayerState::Idle);
        let (current, queue) = player.playback_snapshot();
        assert_eq!(current, None);
        assert!(queue.is_empty());
    }
}
