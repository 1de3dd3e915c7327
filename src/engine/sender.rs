use super::Shared;
use crate::{debug, trace, warn};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Detach the in-flight report, post-process it and hand it to the
/// transport. Returns the number of values handed over.
pub(crate) async fn send(shared: &Shared) -> usize {
    let report = shared.buffer.swap();
    let report = shared.caches.lock().process(report);

    if report.is_empty() {
        trace!("no measurement data to send");
        return 0;
    }

    let count = report.data_count();
    shared
        .stats
        .record_report(count as u64, report.collection_time());

    match shared.transport.send(report).await {
        Ok(()) => {
            debug!("sent report with {count} values");
            shared.stats.sent();
        }
        Err(e) => {
            shared.stats.send_failed();
            warn!("failed to send measurement report: {e}");
        }
    }

    count
}

pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let period = shared.config.send_interval;
    let start = Instant::now() + shared.config.initial_delay.max(period);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                send(&shared).await;
            }
        }
    }

    debug!("sender stopped");
}
