use crate::error::{Error, Result};
use crate::peer::connection::MediaPeer;
use crate::peer::ice::wait_for_gathering_complete;
use crate::signaling::Signaling;
use std::time::Duration;
use tracing::info;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// Одно согласование без trickle ICE: recvonly video + audio → offer →
/// ожидание окончания сбора кандидатов → отправка.
///
/// Отправляется local description, прочитанный после сбора, а не исходный offer:
/// к нему уже добавлены кандидаты.
pub async fn negotiate(
    peer: &dyn MediaPeer,
    signaling: &dyn Signaling,
    gather_timeout: Option<Duration>,
) -> Result<RTCSessionDescription> {
    peer.add_recvonly_transceiver(RTPCodecType::Video).await?;
    peer.add_recvonly_transceiver(RTPCodecType::Audio).await?;

    info!("Creating offer...");
    let offer = peer.create_offer().await?;
    info!("Setting local description (offer)...");
    peer.set_local_description(offer).await?;

    wait_for_gathering_complete(peer.gathering_state(), gather_timeout).await?;

    let local = peer
        .local_description()
        .await
        .ok_or(Error::MissingLocalDescription)?;

    info!("Sending offer ({} bytes of SDP)", local.sdp.len());
    signaling.send_offer(&local).await?;
    Ok(local)
}
