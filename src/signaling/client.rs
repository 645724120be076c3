//! Клиент Socket.IO поверх WebSocket-транспорта

use super::protocol::{
    socket_io_url, EnginePacket, Handshake, SocketPacket, DEFAULT_NAMESPACE, EVENT_ANSWER,
    EVENT_JOIN, EVENT_OFFER,
};
use super::{Signaling, SignalingConfig};
use crate::error::{Error, Result};
use crate::peer::types::RoomMembership;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Команды для задачи-отправителя
enum Outbound {
    Frame(String),
    Flush(oneshot::Sender<()>),
    Close,
}

pub struct SignalingClient {
    sid: String,
    tx: mpsc::UnboundedSender<Outbound>,
    answers: Mutex<Option<mpsc::UnboundedReceiver<RTCSessionDescription>>>,
}

impl SignalingClient {
    /// Подключение: WebSocket → open-пакет Engine.IO → connect к namespace `/`.
    ///
    /// Возвращается только после подтверждения connect: до него сервер
    /// отбрасывает события, отправленные в namespace.
    pub async fn connect(config: &SignalingConfig) -> Result<Self> {
        let url = socket_io_url(&config.url)?;
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let handshake = Self::await_handshake(&mut read).await?;
        info!(
            "Engine.IO session {} opened (ping every {} ms)",
            handshake.sid, handshake.ping_interval
        );
        write
            .send(Message::Text(SocketPacket::connect().to_frame()))
            .await?;

        let ack_window = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        let ack = tokio::time::timeout(
            ack_window,
            Self::await_namespace_connect(&mut read, &mut write),
        )
        .await
        .map_err(|_| {
            Error::Protocol(format!(
                "namespace connect not acknowledged within {ack_window:?}"
            ))
        })??;
        info!("Connected to signaling namespace: {:?}", ack);

        let (tx, rx) = mpsc::unbounded_channel();
        let (answer_tx, answer_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, tx.clone(), answer_tx));

        Ok(Self {
            sid: handshake.sid,
            tx,
            answers: Mutex::new(Some(answer_rx)),
        })
    }

    /// Engine.IO session id
    pub fn sid(&self) -> &str {
        &self.sid
    }

    async fn await_handshake(read: &mut SplitStream<WsStream>) -> Result<Handshake> {
        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => {
                    return match EnginePacket::decode(&text)? {
                        EnginePacket::Open(handshake) => Ok(handshake),
                        other => Err(Error::Protocol(format!(
                            "expected Engine.IO open packet, got {other:?}"
                        ))),
                    };
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(Error::SignalingClosed)
    }

    /// Ждёт `40` от сервера, по пути отвечая на ping
    async fn await_namespace_connect(
        read: &mut SplitStream<WsStream>,
        write: &mut SplitSink<WsStream, Message>,
    ) -> Result<Option<Value>> {
        while let Some(msg) = read.next().await {
            let text = match msg? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match EnginePacket::decode(&text)? {
                EnginePacket::Ping(data) => {
                    write
                        .send(Message::Text(EnginePacket::Pong(data).encode()))
                        .await?
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect { namespace, data } if namespace == DEFAULT_NAMESPACE => {
                        return Ok(data)
                    }
                    SocketPacket::ConnectError { data, .. } => {
                        return Err(Error::NamespaceRefused(data.to_string()))
                    }
                    other => debug!("Ignoring {:?} before namespace connect", other),
                },
                EnginePacket::Close => break,
                other => trace!("Ignoring Engine.IO packet {:?}", other),
            }
        }
        Err(Error::SignalingClosed)
    }

    fn enqueue(&self, out: Outbound) -> Result<()> {
        self.tx.send(out).map_err(|_| Error::SignalingClosed)
    }

    fn emit(&self, event: &str, data: Value) -> Result<()> {
        debug!("emit {}", event);
        self.enqueue(Outbound::Frame(SocketPacket::event(event, data).to_frame()))
    }

    async fn sender_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Outbound>,
    ) {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Frame(frame) => {
                    trace!("-> {}", frame);
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        error!("Failed to send signaling frame: {}", e);
                        break;
                    }
                }
                Outbound::Flush(ack) => {
                    if let Err(e) = write.flush().await {
                        error!("Failed to flush signaling socket: {}", e);
                        break;
                    }
                    let _ = ack.send(());
                }
                Outbound::Close => {
                    let _ = write
                        .send(Message::Text(SocketPacket::disconnect().to_frame()))
                        .await;
                    let _ = write.close().await;
                    break;
                }
            }
        }

        debug!("Sender task terminated");
    }

    async fn receiver_task(
        mut read: SplitStream<WsStream>,
        tx: mpsc::UnboundedSender<Outbound>,
        answers: mpsc::UnboundedSender<RTCSessionDescription>,
    ) {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    trace!("<- {}", text);
                    if let Err(e) = Self::handle_frame(&text, &tx, &answers) {
                        warn!("Failed to handle signaling frame: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Signaling connection closed");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Receiver task terminated");
    }

    fn handle_frame(
        text: &str,
        tx: &mpsc::UnboundedSender<Outbound>,
        answers: &mpsc::UnboundedSender<RTCSessionDescription>,
    ) -> Result<()> {
        match EnginePacket::decode(text)? {
            EnginePacket::Ping(data) => {
                let _ = tx.send(Outbound::Frame(EnginePacket::Pong(data).encode()));
            }
            EnginePacket::Message(body) => Self::handle_packet(SocketPacket::decode(&body)?, answers)?,
            EnginePacket::Close => info!("Server closed the Engine.IO session"),
            other => trace!("Ignoring Engine.IO packet {:?}", other),
        }
        Ok(())
    }

    fn handle_packet(
        packet: SocketPacket,
        answers: &mpsc::UnboundedSender<RTCSessionDescription>,
    ) -> Result<()> {
        match packet {
            SocketPacket::Connect { data, .. } => {
                debug!("Repeated namespace connect: {:?}", data)
            }
            SocketPacket::ConnectError { data, .. } => {
                warn!("Signaling namespace refused connection: {}", data)
            }
            SocketPacket::Disconnect { .. } => warn!("Disconnected from signaling namespace"),
            SocketPacket::Event { name, data, .. } if name == EVENT_ANSWER => {
                let answer: RTCSessionDescription = serde_json::from_value(data)?;
                info!("Received answer ({} bytes of SDP)", answer.sdp.len());
                if answers.send(answer).is_err() {
                    debug!("Nobody is listening for answers, dropping");
                }
            }
            SocketPacket::Event { name, .. } => debug!("Ignoring signaling event {}", name),
            SocketPacket::Ack { id, .. } => trace!("Ignoring ack {}", id),
        }
        Ok(())
    }
}

#[async_trait]
impl Signaling for SignalingClient {
    async fn join(&self, membership: &RoomMembership) -> Result<()> {
        info!(
            "Joining room {} as {:?}",
            membership.room, membership.username
        );
        self.emit(EVENT_JOIN, serde_json::to_value(membership)?)
    }

    async fn send_offer(&self, offer: &RTCSessionDescription) -> Result<()> {
        self.emit(EVENT_OFFER, serde_json::to_value(offer)?)
    }

    fn take_answers(&self) -> Option<mpsc::UnboundedReceiver<RTCSessionDescription>> {
        self.answers.lock().ok()?.take()
    }

    async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(Outbound::Flush(ack_tx))?;
        ack_rx.await.map_err(|_| Error::SignalingClosed)
    }

    async fn close(&self) -> Result<()> {
        // повторное закрытие не ошибка
        let _ = self.enqueue(Outbound::Close);
        Ok(())
    }
}
