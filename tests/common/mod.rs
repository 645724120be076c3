#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_viewer_lib::error::{Error, Result};
use stream_viewer_lib::peer::{
    GatheringState, MediaPeer, PeerFactory, RoomMembership, TrackSink, TrackStats,
};
use stream_viewer_lib::session::EventSender;
use stream_viewer_lib::signaling::Signaling;
use tokio::sync::{mpsc, watch};
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n";
pub const CANDIDATE_LINE: &str = "a=candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\ns=-\r\n";

pub fn description(kind: &str, sdp: &str) -> RTCSessionDescription {
    serde_json::from_value(serde_json::json!({ "type": kind, "sdp": sdp }))
        .expect("valid session description json")
}

pub fn answer() -> RTCSessionDescription {
    description("answer", ANSWER_SDP)
}

/// Всё, что сделали с моками, в порядке вызовов
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Join(RoomMembership),
    SendOffer { sdp_type: String, sdp: String },
    Flush,
    SignalingClose,
    AddTransceiver(RTPCodecType),
    CreateOffer,
    SetLocal(String),
    SetRemote(String),
    OnTrack,
    PeerClose,
    SinkFinish,
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn offers(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendOffer { sdp_type, sdp } => Some((sdp_type, sdp)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    /// Ждёт, пока в журнале не появится подходящий вызов
    pub async fn wait_for(&self, pred: impl Fn(&Call) -> bool) {
        for _ in 0..1000 {
            if self.calls().iter().any(&pred) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("call never happened; journal: {:?}", self.calls());
    }
}

pub struct MockSignaling {
    journal: Journal,
    answers: Mutex<Option<mpsc::UnboundedReceiver<RTCSessionDescription>>>,
    answer_tx: mpsc::UnboundedSender<RTCSessionDescription>,
}

impl MockSignaling {
    pub fn new(journal: Journal) -> Self {
        let (answer_tx, answer_rx) = mpsc::unbounded_channel();
        Self {
            journal,
            answers: Mutex::new(Some(answer_rx)),
            answer_tx,
        }
    }

    /// Имитирует приход `answer` от сервера
    pub fn deliver_answer(&self, desc: RTCSessionDescription) {
        self.answer_tx.send(desc).unwrap();
    }
}

#[async_trait]
impl Signaling for MockSignaling {
    async fn join(&self, membership: &RoomMembership) -> Result<()> {
        self.journal.push(Call::Join(membership.clone()));
        Ok(())
    }

    async fn send_offer(&self, offer: &RTCSessionDescription) -> Result<()> {
        let wire = serde_json::to_value(offer)?;
        self.journal.push(Call::SendOffer {
            sdp_type: wire["type"].as_str().unwrap_or_default().to_string(),
            sdp: wire["sdp"].as_str().unwrap_or_default().to_string(),
        });
        Ok(())
    }

    fn take_answers(&self) -> Option<mpsc::UnboundedReceiver<RTCSessionDescription>> {
        self.answers.lock().unwrap().take()
    }

    async fn flush(&self) -> Result<()> {
        self.journal.push(Call::Flush);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.journal.push(Call::SignalingClose);
        Ok(())
    }
}

/// Peer, у которого состояние сбора кандидатов управляется тестом.
///
/// `local_description` после `Complete` возвращает SDP с добавленным кандидатом,
/// как это делает настоящий движок.
pub struct MockPeer {
    journal: Journal,
    gathering_tx: watch::Sender<GatheringState>,
    gathering_rx: watch::Receiver<GatheringState>,
    local: Mutex<Option<String>>,
    gathering_reads: AtomicUsize,
    watchers_at_read_back: Mutex<Option<usize>>,
    pub fail_create_offer: bool,
    pub reject_remote: bool,
}

impl MockPeer {
    pub fn new(journal: Journal, initial: GatheringState) -> Self {
        let (gathering_tx, gathering_rx) = watch::channel(initial);
        Self {
            journal,
            gathering_tx,
            gathering_rx,
            local: Mutex::new(None),
            gathering_reads: AtomicUsize::new(0),
            watchers_at_read_back: Mutex::new(None),
            fail_create_offer: false,
            reject_remote: false,
        }
    }

    pub fn set_gathering(&self, state: GatheringState) {
        self.gathering_tx.send_replace(state);
    }

    /// Активные подписчики на состояние сбора, кроме собственного приёмника мока
    pub fn gathering_watchers(&self) -> usize {
        self.gathering_tx.receiver_count() - 1
    }

    /// Сколько раз запрашивалось состояние сбора
    pub fn gathering_reads(&self) -> usize {
        self.gathering_reads.load(Ordering::SeqCst)
    }

    /// Подписчики на состояние сбора в момент чтения local description
    pub fn watchers_at_read_back(&self) -> Option<usize> {
        *self.watchers_at_read_back.lock().unwrap()
    }
}

#[async_trait]
impl MediaPeer for MockPeer {
    async fn add_recvonly_transceiver(&self, kind: RTPCodecType) -> Result<()> {
        self.journal.push(Call::AddTransceiver(kind));
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription> {
        self.journal.push(Call::CreateOffer);
        if self.fail_create_offer {
            return Err(Error::WebRtc(webrtc::Error::ErrConnectionClosed));
        }
        Ok(description("offer", OFFER_SDP))
    }

    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()> {
        self.journal.push(Call::SetLocal(desc.sdp.clone()));
        *self.local.lock().unwrap() = Some(desc.sdp);
        Ok(())
    }

    async fn local_description(&self) -> Option<RTCSessionDescription> {
        *self.watchers_at_read_back.lock().unwrap() = Some(self.gathering_watchers());
        let sdp = self.local.lock().unwrap().clone()?;
        let sdp = if *self.gathering_rx.borrow() == GatheringState::Complete {
            format!("{sdp}{CANDIDATE_LINE}")
        } else {
            sdp
        };
        Some(description("offer", &sdp))
    }

    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()> {
        self.journal.push(Call::SetRemote(desc.sdp));
        if self.reject_remote {
            return Err(Error::WebRtc(webrtc::Error::ErrConnectionClosed));
        }
        Ok(())
    }

    fn gathering_state(&self) -> watch::Receiver<GatheringState> {
        self.gathering_reads.fetch_add(1, Ordering::SeqCst);
        self.gathering_rx.clone()
    }

    fn on_track(&self, _sink: Arc<dyn TrackSink>) {
        self.journal.push(Call::OnTrack);
    }

    async fn close(&self) -> Result<()> {
        self.journal.push(Call::PeerClose);
        Ok(())
    }
}

/// Отдаёт заранее созданный MockPeer и запоминает конфигурации
pub struct MockFactory {
    peer: Arc<MockPeer>,
    pub configs: Mutex<Vec<RTCConfiguration>>,
}

impl MockFactory {
    pub fn new(peer: Arc<MockPeer>) -> Self {
        Self {
            peer,
            configs: Mutex::new(Vec::new()),
        }
    }

    pub fn ice_server_urls(&self) -> Vec<Vec<String>> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .flat_map(|c| c.ice_servers.iter().map(|s| s.urls.clone()))
            .collect()
    }
}

#[async_trait]
impl PeerFactory for MockFactory {
    async fn create(
        &self,
        config: RTCConfiguration,
        _events: EventSender,
    ) -> Result<Arc<dyn MediaPeer>> {
        self.configs.lock().unwrap().push(config);
        Ok(self.peer.clone())
    }
}

/// Sink без треков; отмечает в журнале только `finish`
pub struct JournalSink(pub Journal);

#[async_trait]
impl TrackSink for JournalSink {
    fn attach(&self, _track: Arc<TrackRemote>) {}

    async fn finish(&self) -> Vec<TrackStats> {
        self.0.push(Call::SinkFinish);
        vec![TrackStats {
            packets: 10,
            bytes: 1000,
        }]
    }
}

pub const SHORT: Duration = Duration::from_secs(1);
