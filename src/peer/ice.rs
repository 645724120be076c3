use crate::error::{Error, Result};
use crate::peer::types::GatheringState;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;

/// Ждёт, пока сбор ICE кандидатов не перейдёт в `Complete`.
///
/// Если сбор уже завершён, возвращается сразу. Ожидание одноразовое:
/// приёмник поглощается и больше не используется.
pub async fn wait_for_gathering_complete(
    mut state: watch::Receiver<GatheringState>,
    limit: Option<Duration>,
) -> Result<()> {
    if *state.borrow() == GatheringState::Complete {
        debug!("ICE gathering already complete");
        return Ok(());
    }

    debug!("Waiting for ICE gathering to complete...");
    let wait = async {
        state
            .wait_for(|s| *s == GatheringState::Complete)
            .await
            .map(|_| ())
            .map_err(|_| Error::GatheringAborted)
    };

    match limit {
        Some(limit) => timeout(limit, wait)
            .await
            .map_err(|_| Error::GatheringTimeout(limit))?,
        None => wait.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_immediately_when_already_complete() {
        let (_tx, rx) = watch::channel(GatheringState::Complete);
        wait_for_gathering_complete(rx, Some(Duration::from_millis(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resolves_on_transition_to_complete() {
        let (tx, rx) = watch::channel(GatheringState::New);
        let waiter = tokio::spawn(wait_for_gathering_complete(rx, None));

        tx.send(GatheringState::Gathering).unwrap();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tx.send(GatheringState::Complete).unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropped_sender_aborts_the_wait() {
        let (tx, rx) = watch::channel(GatheringState::Gathering);
        drop(tx);
        let err = wait_for_gathering_complete(rx, None).await.unwrap_err();
        assert!(matches!(err, Error::GatheringAborted));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_limit_is_set() {
        let (_tx, rx) = watch::channel(GatheringState::Gathering);
        let err = wait_for_gathering_complete(rx, Some(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GatheringTimeout(d) if d == Duration::from_secs(10)));
    }
}
