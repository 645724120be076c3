use crate::config::{DEFAULT_ROOM, DEFAULT_STUN_URL, DEFAULT_USERNAME};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;

/// Параметры одной сессии; не меняются после `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Добавить публичный STUN сервер в конфигурацию peer connection
    pub use_stun: bool,
    pub stun_url: String,
    /// `None`: ждать окончания сбора кандидатов бесконечно
    pub gather_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_stun: false,
            stun_url: DEFAULT_STUN_URL.to_string(),
            gather_timeout: None,
        }
    }
}

/// Полезная нагрузка события `join`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    pub room: String,
    pub username: String,
}

impl Default for RoomMembership {
    fn default() -> Self {
        Self {
            room: DEFAULT_ROOM.to_string(),
            username: DEFAULT_USERNAME.to_string(),
        }
    }
}

/// Состояние сбора ICE кандидатов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

impl From<RTCIceGathererState> for GatheringState {
    fn from(state: RTCIceGathererState) -> Self {
        match state {
            RTCIceGathererState::Gathering => Self::Gathering,
            RTCIceGathererState::Complete => Self::Complete,
            _ => Self::New,
        }
    }
}

impl From<RTCIceGatheringState> for GatheringState {
    fn from(state: RTCIceGatheringState) -> Self {
        match state {
            RTCIceGatheringState::Gathering => Self::Gathering,
            RTCIceGatheringState::Complete => Self::Complete,
            _ => Self::New,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_payload_shape() {
        let json = serde_json::to_value(RoomMembership::default()).unwrap();
        assert_eq!(json, serde_json::json!({"room": "1", "username": "remote peer"}));
    }

    #[test]
    fn gatherer_states_map_onto_gathering_state() {
        assert_eq!(
            GatheringState::from(RTCIceGathererState::Complete),
            GatheringState::Complete
        );
        assert_eq!(
            GatheringState::from(RTCIceGathererState::Gathering),
            GatheringState::Gathering
        );
        assert_eq!(
            GatheringState::from(RTCIceGathererState::Closed),
            GatheringState::New
        );
        assert_eq!(
            GatheringState::from(RTCIceGatheringState::Complete),
            GatheringState::Complete
        );
    }
}
