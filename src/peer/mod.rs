pub mod connection;
pub mod ice;
pub mod negotiation;
pub mod sink;
pub mod types;

pub use connection::{rtc_config, MediaPeer, PeerFactory, WebRtcPeer, WebRtcPeerFactory};
pub use sink::{DrainSink, RecorderConfig, RecorderSink, TrackSink, TrackStats};
pub use types::{GatheringState, RoomMembership, SessionConfig};
