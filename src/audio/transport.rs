use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::error::JoinError;
use songbird::input::{HttpRequest, Input};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, warn};

use crate::audio::voice::{StreamOutcome, VoiceTransport};
use crate::error::VoiceError;

/// Frecuencia de sondeo de la confirmación de sesión de voz.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transporte de voz real, sobre el driver de songbird.
///
/// Mantiene el handle del track en curso por guild para poder detenerlo
/// y para responder [`VoiceTransport::is_streaming`] con el estado del
/// driver, no con contabilidad propia.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            current: DashMap::new(),
        }
    }

    fn classify_join_error(err: JoinError) -> VoiceError {
        match err {
            // El driver descartó el intento a mitad del handshake
            JoinError::TimedOut | JoinError::Dropped => VoiceError::HandshakeTimeout,
            JoinError::Driver(e) => VoiceError::Driver(e.to_string()),
            other => VoiceError::ConnectionClosed(other.to_string()),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> Result<(), VoiceError> {
        match time::timeout(timeout, self.manager.join(guild_id, channel_id)).await {
            Err(_) => Err(VoiceError::HandshakeTimeout),
            Ok(Err(err)) => Err(Self::classify_join_error(err)),
            Ok(Ok(_call)) => Ok(()),
        }
    }

    async fn wait_ready(&self, guild_id: GuildId, timeout: Duration) -> Result<(), VoiceError> {
        let Some(call) = self.manager.get(guild_id) else {
            return Err(VoiceError::NotConnected);
        };

        let deadline = time::Instant::now() + timeout;
        loop {
            if call.lock().await.current_connection().is_some() {
                debug!("sesión de voz confirmada en guild {guild_id}");
                return Ok(());
            }
            if time::Instant::now() >= deadline {
                return Err(VoiceError::HandshakeTimeout);
            }
            time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.manager.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn is_streaming(&self, guild_id: GuildId) -> bool {
        let Some(handle) = self.current.get(&guild_id).map(|h| h.clone()) else {
            return false;
        };
        matches!(handle.get_info().await, Ok(info) if matches!(info.playing, PlayMode::Play))
    }

    async fn start_stream(
        &self,
        guild_id: GuildId,
        url: &str,
    ) -> Result<oneshot::Receiver<StreamOutcome>, VoiceError> {
        let Some(call) = self.manager.get(guild_id) else {
            return Err(VoiceError::NotConnected);
        };

        let input: Input = HttpRequest::new(self.http.clone(), url.to_string()).into();
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let handle = call.lock().await.play_input(input);

        // El mismo emisor en End y Error: el primero que dispare entrega
        // el resultado y el otro encuentra el canal ya consumido.
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), StreamEndNotifier { tx: tx.clone() })
                .map_err(|e| {
                    let _ = handle.stop();
                    VoiceError::Driver(e.to_string())
                })?;
        }

        self.current.insert(guild_id, handle);
        Ok(rx)
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.current.remove(&guild_id) {
            let _ = handle.stop();
        }
    }

    async fn disconnect(&self, guild_id: GuildId) {
        self.stop(guild_id).await;
        if let Err(err) = self.manager.remove(guild_id).await {
            warn!("⚠️ Error al cerrar la sesión de voz en guild {guild_id}: {err}");
        }
    }
}

/// Entrega el resultado del stream exactamente una vez.
struct StreamEndNotifier {
    tx: Arc<Mutex<Option<oneshot::Sender<StreamOutcome>>>>,
}

#[async_trait]
impl VoiceEventHandler for StreamEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(track_list) => {
                let failure = track_list.iter().find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(err) => Some(err.to_string()),
                    _ => None,
                });
                match failure {
                    Some(detail) => StreamOutcome::Failed(detail),
                    None => StreamOutcome::Finished,
                }
            }
            _ => StreamOutcome::Finished,
        };

        if let Some(tx) = self.tx.lock().take() {
            // El receptor pudo haberse descartado (p.ej. reset); no importa
            let _ = tx.send(outcome);
        }
        None
    }
}
