//! Error types for the playback core.
//!
//! Everything the session layer can report to a command handler is a
//! [`SessionError`]. None of these are fatal to the process: they stay scoped
//! to the session (or the single track) that produced them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A query could not be turned into a playable source
    #[error("No se pudo resolver la canción: {0}")]
    Resolution(String),

    /// A playlist/album reference could not be expanded
    #[error("Error al consultar el catálogo: {0}")]
    Catalog(String),

    /// Queue index outside `[0, len)`
    #[error("Índice fuera de rango: {index} (la cola tiene {len} canciones)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Volume outside `[0.0, 1.0]` (or a percentage outside `0..=100`)
    #[error("Volumen inválido: {0}")]
    InvalidVolume(f32),

    /// The session has been stopped and accepts no more commands
    #[error("La sesión de reproducción ya terminó")]
    SessionClosed,

    /// Control command issued while nothing is playing
    #[error("No hay nada reproduciéndose ahora mismo")]
    NoActiveSession,

    /// The audio transport failed
    #[error("Error en la conexión de audio: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
