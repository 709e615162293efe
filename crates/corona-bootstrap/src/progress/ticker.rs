//! Background progress ticker.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ProgressControl;

const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Spawn the tick loop on `handle`. The loop advances `control` by `step`
/// every `period` until `cancel` fires or the surface is detached.
pub(crate) fn spawn_ticker(
    handle: &Handle,
    control: ProgressControl,
    period: Duration,
    step: u8,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(MIN_PERIOD);
    handle.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if !control.is_attached() {
                        break;
                    }
                    control.advance(step);
                    ticks += 1;
                }
            }
        }
        debug!(ticks, "progress ticker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSurface;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_advances_until_cancelled() {
        let surface = Arc::new(RecordingSurface::default());
        let control = ProgressControl::attached(surface.clone());
        let cancel = CancellationToken::new();

        let task = spawn_ticker(
            &Handle::current(),
            control.clone(),
            Duration::from_millis(100),
            10,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(450)).await;
        cancel.cancel();
        task.await.unwrap();

        let ticks = surface.progress_updates().len();
        assert!(ticks >= 3, "expected at least 3 ticks, got {ticks}");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(surface.progress_updates().len(), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_when_detached() {
        let surface = Arc::new(RecordingSurface::default());
        let control = ProgressControl::attached(surface.clone());

        let task = spawn_ticker(
            &Handle::current(),
            control.clone(),
            Duration::from_millis(100),
            10,
            CancellationToken::new(),
        );

        control.detach();
        tokio::time::sleep(Duration::from_millis(300)).await;
        task.await.unwrap();
        assert!(surface.progress_updates().is_empty());
    }
}
