use crate::session::SessionState;
use thiserror::Error;

/// Ошибки клиента
#[derive(Debug, Error)]
pub enum Error {
    /// Ошибка движка WebRTC (create_offer, set_local_description, ...)
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid signaling URL: {0}")]
    Url(#[from] url::ParseError),

    /// Ошибка записи принятого медиа
    #[error("media error: {0}")]
    Media(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Нарушение протокола Engine.IO / Socket.IO
    #[error("signaling protocol error: {0}")]
    Protocol(String),

    /// Сервер отказал в подключении к namespace
    #[error("signaling namespace refused connection: {0}")]
    NamespaceRefused(String),

    /// Канал сигнализации закрыт, отправка невозможна
    #[error("signaling channel closed")]
    SignalingClosed,

    #[error("operation `{operation}` not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// После сбора кандидатов local description отсутствует
    #[error("local description missing after ICE gathering")]
    MissingLocalDescription,

    #[error("ICE gathering aborted before completion")]
    GatheringAborted,

    #[error("ICE gathering did not complete within {0:?}")]
    GatheringTimeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
