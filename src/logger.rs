use once_cell::sync::OnceCell;
use tracing::{debug, info};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;

static INIT: OnceCell<()> = OnceCell::new();

/// Формат временных меток в логах
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Включено ли логирование: по конфигурации сборки или явным `RUST_LOG`
fn enabled(rust_log_set: bool) -> bool {
    rust_log_set || (crate::config::LOGGING_ENABLED && crate::config::dev::ENABLE_LOGGING)
}

/// Настройка логирования с временными метками.
///
/// `RUST_LOG` имеет приоритет над `verbosity` и включает логи даже там, где
/// сборка их отключает (release). Повторные вызовы ничего не делают.
pub fn init(verbosity: u8) {
    if !enabled(std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()) {
        return;
    }

    INIT.get_or_init(|| {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        // может уже стоять глобальный subscriber (например, в тестах)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            .with_target(false)
            .try_init();
    });
}

/// Печать ICE-candidate при появлении
pub fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        debug!(
            "{label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index
        );
    }
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                info!(
                    "STATS {moment}: {}:{} bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}
