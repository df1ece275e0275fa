use thiserror::Error;

/// Códigos de cierre de la gateway de voz que se consideran recuperables:
/// 4006 (sesión inválida), 4009 (timeout de sesión), 4015 (caída del servidor).
const RECOVERABLE_CLOSE_CODES: [u16; 3] = [4006, 4009, 4015];

/// Errores de la capa de voz.
///
/// La clasificación transitorio/fatal decide la política de reintento:
/// los transitorios se reintentan dentro del presupuesto del
/// `VoiceConnectionManager`, los fatales se devuelven de inmediato.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("timed out during the voice handshake")]
    HandshakeTimeout,

    #[error("voice session dropped mid-handshake (close code {0})")]
    SessionDropped(u16),

    #[error("missing permission to join or speak in the voice channel")]
    MissingPermissions,

    #[error("voice gateway closed the connection: {0}")]
    ConnectionClosed(String),

    #[error("could not join the voice channel after {0} attempts")]
    RetriesExhausted(u8),

    #[error("no active voice session for this guild")]
    NotConnected,

    #[error("voice driver error: {0}")]
    Driver(String),
}

impl VoiceError {
    /// true si el error se presume recuperable reintentando.
    pub fn is_transient(&self) -> bool {
        match self {
            VoiceError::HandshakeTimeout => true,
            VoiceError::SessionDropped(code) => RECOVERABLE_CLOSE_CODES.contains(code),
            _ => false,
        }
    }
}
