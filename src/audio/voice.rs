use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{error, info, warn};

use crate::error::VoiceError;

/// Intentos máximos de conexión antes de rendirse.
pub const MAX_CONNECT_ATTEMPTS: u8 = 5;
/// Techo del backoff exponencial, en segundos.
const BACKOFF_CEILING_SECS: u64 = 10;
/// Cota del intento de conexión.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Cota de la espera de confirmación de sesión establecida.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Resultado único de un stream, entregado exactamente una vez al
/// terminar: éxito o error del transporte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished,
    Failed(String),
}

/// Transporte de voz: conexión y entrega de audio, tratado como caja negra.
///
/// La implementación real (songbird) vive en [`crate::audio::transport`];
/// el player y el gestor de conexión sólo conocen este contrato.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Conecta al canal de voz, acotado por `timeout`.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> Result<(), VoiceError>;

    /// Espera la confirmación de que la sesión quedó completamente
    /// establecida. Un timeout aquí cuenta como fallo transitorio.
    async fn wait_ready(&self, guild_id: GuildId, timeout: Duration) -> Result<(), VoiceError>;

    async fn is_connected(&self, guild_id: GuildId) -> bool;

    /// true si hay un track entregándose activamente.
    async fn is_streaming(&self, guild_id: GuildId) -> bool;

    /// Comienza a entregar `url`; el resultado de la reproducción llega
    /// una única vez por el canal devuelto.
    async fn start_stream(
        &self,
        guild_id: GuildId,
        url: &str,
    ) -> Result<oneshot::Receiver<StreamOutcome>, VoiceError>;

    /// Detiene el track en curso, si lo hay.
    async fn stop(&self, guild_id: GuildId);

    /// Cierra la sesión de voz de la guild.
    async fn disconnect(&self, guild_id: GuildId);
}

/// Gestor de conexión a voz con reintentos acotados.
///
/// Los fallos transitorios (timeout de handshake, cierres recuperables)
/// se reintentan hasta [`MAX_CONNECT_ATTEMPTS`] con backoff exponencial
/// `min(2^intento, 10)` segundos; los fatales abortan de inmediato.
pub struct VoiceConnectionManager {
    transport: Arc<dyn VoiceTransport>,
    connect_timeout: Duration,
    ready_timeout: Duration,
}

impl VoiceConnectionManager {
    pub fn new(transport: Arc<dyn VoiceTransport>) -> Self {
        Self {
            transport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    fn backoff_delay(attempt: u8) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt.into()).min(BACKOFF_CEILING_SECS))
    }

    /// Conecta con reintentos. Devuelve `Ok` con la sesión establecida y
    /// confirmada, o el error fatal que abortó el ciclo.
    pub async fn connect_with_retry(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), VoiceError> {
        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match self.try_connect(guild_id, channel_id).await {
                Ok(()) => {
                    info!("🔊 Conectado al canal de voz en guild {guild_id} (intento {attempt})");
                    return Ok(());
                }
                Err(err) if err.is_transient() => {
                    let delay = Self::backoff_delay(attempt);
                    warn!(
                        "⚠️ Intento {attempt}/{MAX_CONNECT_ATTEMPTS} de conexión falló ({err}), \
                         reintentando en {}s",
                        delay.as_secs()
                    );
                    if attempt < MAX_CONNECT_ATTEMPTS {
                        time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    error!("❌ Fallo fatal al conectar a voz en guild {guild_id}: {err}");
                    return Err(err);
                }
            }
        }

        error!("❌ Agotados los {MAX_CONNECT_ATTEMPTS} intentos de conexión en guild {guild_id}");
        Err(VoiceError::RetriesExhausted(MAX_CONNECT_ATTEMPTS))
    }

    async fn try_connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), VoiceError> {
        self.transport
            .connect(guild_id, channel_id, self.connect_timeout)
            .await?;
        self.transport
            .wait_ready(guild_id, self.ready_timeout)
            .await
    }
}
