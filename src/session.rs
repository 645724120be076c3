use crate::error::{Error, Result};
use crate::peer::connection::{rtc_config, MediaPeer, PeerFactory};
use crate::peer::negotiation::negotiate;
use crate::peer::sink::TrackSink;
use crate::peer::types::{RoomMembership, SessionConfig};
use crate::signaling::Signaling;
use crate::utils::random_id;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// Состояние жизненного цикла сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    /// offer создаётся или идёт сбор кандидатов
    Negotiating,
    /// offer отправлен
    AwaitingAnswer,
    Connected,
    Closed,
}

/// События сессии для вызывающей стороны
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Joined(RoomMembership),
    OfferSent,
    Connected,
    TrackArrived(RTPCodecType),
    PeerStateChanged(RTCPeerConnectionState),
    Failed(String),
    Closed,
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Что стало с пришедшим answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Applied,
    /// Сессия уже описана с обеих сторон; повторный answer не применяется
    Ignored,
}

/// Одна receive-only сессия: одно согласование, один answer, одно закрытие
pub struct Session {
    id: String,
    joined_at: DateTime<Utc>,
    state: SessionState,
    signaling: Arc<dyn Signaling>,
    factory: Arc<dyn PeerFactory>,
    sink: Arc<dyn TrackSink>,
    peer: Option<Arc<dyn MediaPeer>>,
    answers: Option<mpsc::UnboundedReceiver<RTCSessionDescription>>,
    events_tx: EventSender,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl Session {
    /// Входит в комнату и подписывается на answer
    pub async fn join(
        signaling: Arc<dyn Signaling>,
        factory: Arc<dyn PeerFactory>,
        sink: Arc<dyn TrackSink>,
        membership: &RoomMembership,
    ) -> Result<Self> {
        let answers = signaling.take_answers();
        if answers.is_none() {
            warn!("Answer stream already taken; this session will never see an answer");
        }
        signaling.join(membership).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(SessionEvent::Joined(membership.clone()));

        let id = random_id();
        info!("Session {} joined room {}", id, membership.room);

        Ok(Self {
            id,
            joined_at: Utc::now(),
            state: SessionState::Unstarted,
            signaling,
            factory,
            sink,
            peer: None,
            answers,
            events_tx,
            events_rx: Some(events_rx),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Поток событий; отдаётся один раз
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn fail(&self, e: Error) -> Error {
        error!("Session {} negotiation failed: {}", self.id, e);
        self.emit(SessionEvent::Failed(e.to_string()));
        e
    }

    /// Создаёт peer connection и проводит согласование до отправки offer.
    ///
    /// Допускается только из `Unstarted`. При ошибке сессия остаётся в
    /// `Negotiating`: отката нет, остаётся только `stop`.
    pub async fn start(&mut self, config: &SessionConfig) -> Result<RTCSessionDescription> {
        if self.state != SessionState::Unstarted {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.state = SessionState::Negotiating;
        info!(
            "Session {} starting (STUN {})",
            self.id,
            if config.use_stun { "on" } else { "off" }
        );

        let peer = match self
            .factory
            .create(rtc_config(config), self.events_tx.clone())
            .await
        {
            Ok(peer) => peer,
            Err(e) => return Err(self.fail(e)),
        };
        peer.on_track(self.sink.clone());
        self.peer = Some(peer.clone());

        match negotiate(peer.as_ref(), self.signaling.as_ref(), config.gather_timeout).await {
            Ok(offer) => {
                self.state = SessionState::AwaitingAnswer;
                self.emit(SessionEvent::OfferSent);
                Ok(offer)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `start`, прерываемый `shutdown`.
    ///
    /// Если `shutdown` сработал раньше, согласование бросается на месте,
    /// сессия закрывается через `stop` и возвращается `None`.
    pub async fn start_until<F>(
        &mut self,
        config: &SessionConfig,
        shutdown: F,
    ) -> Result<Option<RTCSessionDescription>>
    where
        F: Future<Output = ()>,
    {
        let started = {
            tokio::pin!(shutdown);
            tokio::select! {
                result = self.start(config) => Some(result),
                _ = &mut shutdown => None,
            }
        };

        match started {
            Some(result) => result.map(Some),
            None => {
                info!("Session {} interrupted in {:?}", self.id, self.state);
                self.stop().await?;
                Ok(None)
            }
        }
    }

    /// Применяет answer как remote description.
    ///
    /// В `Negotiating` применение всё равно выполняется; результат решает движок.
    /// Повторный answer после `Connected` игнорируется.
    pub async fn apply_answer(&mut self, answer: RTCSessionDescription) -> Result<AnswerOutcome> {
        match self.state {
            SessionState::Unstarted | SessionState::Closed => Err(Error::InvalidState {
                operation: "apply_answer",
                state: self.state,
            }),
            SessionState::Connected => {
                warn!("Session {} already connected, ignoring answer", self.id);
                Ok(AnswerOutcome::Ignored)
            }
            SessionState::Negotiating | SessionState::AwaitingAnswer => {
                if self.state == SessionState::Negotiating {
                    warn!("Answer arrived before the offer was sent, applying anyway");
                }
                let peer = self.peer.clone().ok_or(Error::InvalidState {
                    operation: "apply_answer",
                    state: self.state,
                })?;

                info!("Setting remote description (answer)...");
                if let Err(e) = peer.set_remote_description(answer).await {
                    return Err(self.fail(e));
                }
                self.state = SessionState::Connected;
                self.emit(SessionEvent::Connected);
                Ok(AnswerOutcome::Applied)
            }
        }
    }

    /// Закрытие из любого состояния: сначала дожидаемся отправки всего, что
    /// уже поставлено в очередь сигнализации, затем закрываем peer connection,
    /// дочитываем треки и закрываем сигнализацию.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        info!(
            "Session {} stopping from {:?} after {}s",
            self.id,
            self.state,
            (Utc::now() - self.joined_at).num_seconds()
        );

        if let Err(e) = self.signaling.flush().await {
            warn!("Signaling flush failed before close: {}", e);
        }

        let closed = match self.peer.take() {
            Some(peer) => peer.close().await,
            None => Ok(()),
        };

        for (i, stats) in self.sink.finish().await.iter().enumerate() {
            info!(
                "Track #{} finished: {} packets, {} bytes",
                i, stats.packets, stats.bytes
            );
        }

        if let Err(e) = self.signaling.close().await {
            warn!("Failed to close signaling: {}", e);
        }

        self.state = SessionState::Closed;
        self.emit(SessionEvent::Closed);
        closed
    }

    /// Применяет приходящие answer, пока не завершится `shutdown`, затем `stop`
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if let Some(mut answers) = self.answers.take() {
            let mut open = true;
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    answer = answers.recv(), if open => match answer {
                        Some(answer) => {
                            if let Err(e) = self.apply_answer(answer).await {
                                error!("Failed to apply answer: {}", e);
                            }
                        }
                        None => {
                            warn!("Signaling channel closed, no answer will arrive");
                            open = false;
                        }
                    },
                }
            }
        } else {
            shutdown.await;
        }

        self.stop().await
    }
}
