pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

use crate::config::Cli;
use crate::peer::{DrainSink, RecorderSink, TrackSink, WebRtcPeerFactory};
use crate::session::{Session, SessionEvent};
use crate::signaling::{Signaling, SignalingClient};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use crate::error::{Error, Result};

/// Подключение к сигнализации, одно согласование, работа до Ctrl-C
pub async fn run(cli: Cli) -> Result<()> {
    let client = SignalingClient::connect(&cli.signaling_config()).await?;
    info!("Signaling session id: {}", client.sid());
    let signaling: Arc<dyn Signaling> = Arc::new(client);

    let recorder = cli.recorder_config();
    let sink: Arc<dyn TrackSink> = if recorder.is_empty() {
        Arc::new(DrainSink::default())
    } else {
        Arc::new(RecorderSink::new(recorder))
    };

    let mut session = Session::join(
        signaling,
        Arc::new(WebRtcPeerFactory),
        sink,
        &cli.membership(),
    )
    .await?;

    if let Some(mut events) = session.events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Failed(reason) => error!("Session failed: {}", reason),
                    other => info!("Session event: {:?}", other),
                }
            }
        });
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, stopping");
    };
    tokio::pin!(shutdown);

    // Ctrl-C слушаем уже во время согласования
    match session
        .start_until(&cli.session_config(), shutdown.as_mut())
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Ok(()),
        Err(e) => {
            if let Err(stop_err) = session.stop().await {
                warn!("Failed to stop session after error: {}", stop_err);
            }
            return Err(e);
        }
    }

    session.run(shutdown).await
}
