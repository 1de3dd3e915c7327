use super::{collector, Shared};
use crate::measurement::now_millis;
use crate::{debug, info};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// Pops due batches and hands them to collector tasks. At most
/// `collector_threads` batches are collected at once; the queue is
/// re-examined after every hand-off and whenever it changes.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let initial_delay = shared.config.initial_delay;
    if !initial_delay.is_zero() {
        debug!("delaying first collection by {initial_delay:?}");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(initial_delay) => {}
        }
    }

    info!("measurement collection started");

    let permits = Arc::new(Semaphore::new(shared.config.collector_threads.max(1)));

    loop {
        let now = now_millis();
        let wait = match shared.queue.lock().peek_next_due() {
            None => shared.config.idle_sleep,
            Some(due) => Duration::from_millis(due.saturating_sub(now)),
        };

        if !wait.is_zero() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = shared.wakeup.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
            continue;
        }

        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let batch = shared.next_batch(now_millis());
        if batch.is_empty() {
            continue;
        }

        let shared = shared.clone();
        tokio::spawn(async move {
            collector::collect(&shared, batch).await;
            drop(permit);
        });
    }

    info!("measurement collection stopped");
}
