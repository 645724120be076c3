// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::peer::sink::RecorderConfig;
use crate::peer::types::{RoomMembership, SessionConfig};
use crate::signaling::SignalingConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

// Дополнительные настройки для режима разработки
#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// ========== DEFAULTS ==========

pub const DEFAULT_SIGNALING_URL: &str = "http://127.0.0.1:5004";
pub const DEFAULT_ROOM: &str = "1";
pub const DEFAULT_USERNAME: &str = "remote peer";
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Путь Engine.IO на стороне сервера
pub const ENGINE_IO_PATH: &str = "/socket.io/";

/// Receive-only WebRTC viewer
#[derive(Parser, Debug, Clone)]
#[command(name = "stream-viewer", version, about)]
pub struct Cli {
    /// Socket.IO signaling server URL
    #[arg(long, env = "SIGNALING_URL", default_value = DEFAULT_SIGNALING_URL)]
    pub signaling_url: String,

    /// Room to join on the signaling server
    #[arg(long, default_value = DEFAULT_ROOM)]
    pub room: String,

    /// Display name announced when joining
    #[arg(long, default_value = DEFAULT_USERNAME)]
    pub username: String,

    /// Attach a public STUN server to the peer connection
    #[arg(long)]
    pub use_stun: bool,

    /// STUN server used with --use-stun (scheme optional)
    #[arg(long, default_value = DEFAULT_STUN_URL)]
    pub stun_url: String,

    /// Give up waiting for ICE gathering after this many seconds
    #[arg(long)]
    pub gather_timeout_secs: Option<u64>,

    /// Record incoming VP8 video to an IVF file
    #[arg(long)]
    pub record_video: Option<PathBuf>,

    /// Record incoming Opus audio to an OGG file
    #[arg(long)]
    pub record_audio: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            use_stun: self.use_stun,
            stun_url: self.stun_url.clone(),
            gather_timeout: self.gather_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn membership(&self) -> RoomMembership {
        RoomMembership {
            room: self.room.clone(),
            username: self.username.clone(),
        }
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            url: self.signaling_url.clone(),
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            video: self.record_video.clone(),
            audio: self.record_audio.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_client() {
        let cli = Cli::parse_from(["stream-viewer"]);
        assert_eq!(cli.signaling_url, "http://127.0.0.1:5004");
        assert!(!cli.use_stun);

        let membership = cli.membership();
        assert_eq!(membership.room, "1");
        assert_eq!(membership.username, "remote peer");

        let session = cli.session_config();
        assert_eq!(session.gather_timeout, None);
        assert!(cli.recorder_config().is_empty());
    }

    #[test]
    fn flags_are_carried_into_session_config() {
        let cli = Cli::parse_from([
            "stream-viewer",
            "--use-stun",
            "--stun-url",
            "stun.example.org:3478",
            "--gather-timeout-secs",
            "5",
            "-vv",
        ]);
        let session = cli.session_config();
        assert!(session.use_stun);
        assert_eq!(session.stun_url, "stun.example.org:3478");
        assert_eq!(session.gather_timeout, Some(Duration::from_secs(5)));
        assert_eq!(cli.verbose, 2);
    }
}
