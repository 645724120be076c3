use crate::error::Result;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::sink::TrackSink;
use crate::peer::types::{GatheringState, SessionConfig};
use crate::session::{EventSender, SessionEvent};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

/// Операции над peer connection, нужные для одного согласования offer/answer
#[async_trait]
pub trait MediaPeer: Send + Sync {
    async fn add_recvonly_transceiver(&self, kind: RTPCodecType) -> Result<()>;

    async fn create_offer(&self) -> Result<RTCSessionDescription>;

    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()>;

    /// Текущий local description, включая добавленные при сборе кандидаты
    async fn local_description(&self) -> Option<RTCSessionDescription>;

    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()>;

    fn gathering_state(&self) -> watch::Receiver<GatheringState>;

    fn on_track(&self, sink: Arc<dyn TrackSink>);

    async fn close(&self) -> Result<()>;
}

/// Создание peer connection по готовой конфигурации
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(
        &self,
        config: RTCConfiguration,
        events: EventSender,
    ) -> Result<Arc<dyn MediaPeer>>;
}

/// Конфигурация peer connection: один STUN сервер или ни одного
pub fn rtc_config(session: &SessionConfig) -> RTCConfiguration {
    let ice_servers = if session.use_stun {
        vec![RTCIceServer {
            urls: vec![add_ice_url_scheme(&session.stun_url)],
            ..Default::default()
        }]
    } else {
        Vec::new()
    };

    RTCConfiguration {
        ice_servers,
        ..Default::default()
    }
}

/// Peer на базе `webrtc::RTCPeerConnection`
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    gathering: watch::Receiver<GatheringState>,
    events: EventSender,
}

impl WebRtcPeer {
    pub async fn new(config: RTCConfiguration, events: EventSender) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(config).await?);

        let (gather_tx, gathering) =
            watch::channel(GatheringState::from(pc.ice_gathering_state()));

        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            debug!("ICE gathering state changed to: {:?}", state);
            let _ = gather_tx.send(GatheringState::from(state));
            Box::pin(async {})
        }));

        pc.on_ice_candidate(Box::new(|cand: Option<RTCIceCandidate>| {
            match cand {
                Some(c) => dump_candidate("LOCAL", &c),
                // None означает конец сбора
                None => debug!("ICE candidate gathering finished (null candidate)"),
            }
            Box::pin(async {})
        }));

        let weak = Arc::downgrade(&pc);
        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("Peer connection state changed to: {:?}", st);
            let _ = state_events.send(SessionEvent::PeerStateChanged(st));

            if matches!(
                st,
                RTCPeerConnectionState::Connected | RTCPeerConnectionState::Failed
            ) {
                if let Some(pc) = weak.upgrade() {
                    let moment = if st == RTCPeerConnectionState::Connected {
                        "CONNECTED"
                    } else {
                        "FAILED"
                    };
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, moment).await;
                    });
                }
            }
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            gathering,
            events,
        })
    }
}

#[async_trait]
impl MediaPeer for WebRtcPeer {
    async fn add_recvonly_transceiver(&self, kind: RTPCodecType) -> Result<()> {
        self.pc
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription> {
        Ok(self.pc.create_offer(None).await?)
    }

    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()> {
        Ok(self.pc.set_local_description(desc).await?)
    }

    async fn local_description(&self) -> Option<RTCSessionDescription> {
        self.pc.local_description().await
    }

    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()> {
        Ok(self.pc.set_remote_description(desc).await?)
    }

    fn gathering_state(&self) -> watch::Receiver<GatheringState> {
        self.gathering.clone()
    }

    fn on_track(&self, sink: Arc<dyn TrackSink>) {
        let events = self.events.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = track.kind();
                info!("Remote {:?} track arrived", kind);
                let _ = events.send(SessionEvent::TrackArrived(kind));
                sink.attach(track);
                Box::pin(async {})
            },
        ));
    }

    async fn close(&self) -> Result<()> {
        Ok(self.pc.close().await?)
    }
}

/// Фабрика настоящих peer connection
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcPeerFactory;

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        config: RTCConfiguration,
        events: EventSender,
    ) -> Result<Arc<dyn MediaPeer>> {
        Ok(Arc::new(WebRtcPeer::new(config, events).await?))
    }
}
