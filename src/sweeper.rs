use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::store::OtpStore;

/// Handle for the background expiry sweeper. Dropping it cancels the task,
/// so tying the handle's lifetime to the server gives a clean stop on
/// shutdown.
pub struct Sweeper {
    // Dropped to signal cancellation — never read directly.
    #[allow(dead_code)]
    cancel: oneshot::Sender<()>,
    _handle: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper").finish()
    }
}

/// Spawns the periodic eviction task for the given store.
pub fn spawn(store: OtpStore, interval_secs: u64) -> Sweeper {
    let (cancel, mut cancelled) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = &mut cancelled => {
                    debug!("sweeper cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let report = store.sweep().await;
                    if report.total() > 0 {
                        info!(
                            challenges = report.challenges,
                            tickets = report.tickets,
                            "swept expired entries"
                        );
                    } else {
                        debug!("sweep found nothing to evict");
                    }
                }
            }
        }
    });

    Sweeper {
        cancel,
        _handle: handle,
    }
}
