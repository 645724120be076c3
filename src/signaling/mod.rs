pub mod client;
pub mod protocol;

use crate::error::Result;
use crate::peer::types::RoomMembership;
use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub use client::SignalingClient;

/// Настройки подключения к серверу сигнализации
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub url: String,
}

/// Канал сигнализации с единственным удалённым участником комнаты
#[async_trait]
pub trait Signaling: Send + Sync {
    /// `join` без подтверждения
    async fn join(&self, membership: &RoomMembership) -> Result<()>;

    /// Отправка финального offer (`{sdp, type}`)
    async fn send_offer(&self, offer: &RTCSessionDescription) -> Result<()>;

    /// Поток входящих answer; отдаётся только один раз
    fn take_answers(&self) -> Option<mpsc::UnboundedReceiver<RTCSessionDescription>>;

    /// Завершается, когда всё поставленное в очередь до вызова записано в сокет
    async fn flush(&self) -> Result<()>;

    /// Disconnect от namespace и закрытие сокета; повторный вызов не ошибка
    async fn close(&self) -> Result<()>;
}
