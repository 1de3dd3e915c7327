use super::Shared;
use crate::invoke::LockType;
use crate::measurement::{now_millis, MeasurementReport, ResourceId};
use crate::schedule::ScheduledMeasurement;
use crate::{debug, trace, warn};

use rand::Rng;
use std::time::Instant;

/// Collect one co-scheduled batch: every entry shares a resource and a due
/// time. The batch is always put back into the queue.
pub(crate) async fn collect(shared: &Shared, batch: Vec<ScheduledMeasurement>) {
    let Some(head) = batch.first() else {
        return;
    };

    let start = Instant::now();
    let now = now_millis();
    let resource_id = head.resource_id();
    let due = head.next_collection();
    let grace = shared.config.late_threshold.as_millis() as u64;

    if now > due.saturating_add(grace) {
        let jitter = rand::rng().random_range(1..=jitter_bound_secs(&batch));
        let next = now + grace + jitter * 1000;

        debug!(
            "{} measurements for resource {resource_id} are {} ms late, rescheduling to {next}",
            batch.len(),
            now - due
        );

        shared.stats.late(batch.len() as u64);
        shared.reschedule_at(batch, next);
        return;
    }

    let report = collect_batch(shared, resource_id, &batch).await;

    shared.reschedule(batch);
    shared.buffer.append(report, start.elapsed());
}

async fn collect_batch(
    shared: &Shared,
    resource_id: ResourceId,
    batch: &[ScheduledMeasurement],
) -> Option<MeasurementReport> {
    let Some(resource) = shared.lookup.resource(resource_id) else {
        debug!("resource {resource_id} is no longer in inventory, skipping collection");
        return None;
    };

    if !resource.is_collectable() {
        trace!(
            "resource {resource_id} is {:?} and {:?}, skipping collection",
            resource.state,
            resource.availability
        );
        return None;
    }

    let Some(facet) = resource.component.measurement() else {
        debug!("resource {resource_id} has no measurement facet, skipping collection");
        return None;
    };

    let requests = batch.iter().map(|entry| entry.request().clone()).collect();

    let guarded = shared.invoker.measurement(
        facet,
        resource.target(),
        LockType::Read,
        shared.config.facet_timeout,
    );

    match guarded.get_values(requests).await {
        Ok(report) => Some(report),
        Err(e) => {
            shared.stats.failed(batch.len() as u64);
            warn!("failed to collect measurements for resource {resource_id}: {e}");
            None
        }
    }
}

/// Upper bound in whole seconds for the jitter added to a late batch: the
/// shortest interval in the batch, never less than one second.
pub(crate) fn jitter_bound_secs(batch: &[ScheduledMeasurement]) -> u64 {
    batch
        .iter()
        .map(|entry| entry.interval_millis() / 1000)
        .min()
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{DataKind, MeasurementScheduleRequest};
    use std::collections::HashSet;
    use std::time::Duration;

    fn entry(id: u32, interval: Duration) -> ScheduledMeasurement {
        let request = MeasurementScheduleRequest::new(
            id,
            format!("m{id}"),
            interval,
            DataKind::NumericAbsolute,
        );
        ScheduledMeasurement::new(1, request, 0)
    }

    #[test]
    fn jitter_bound_is_shortest_interval() {
        let batch = vec![
            entry(1, Duration::from_secs(60)),
            entry(2, Duration::from_secs(30)),
        ];
        assert_eq!(jitter_bound_secs(&batch), 30);
    }

    #[test]
    fn jitter_bound_is_at_least_one_second() {
        assert_eq!(jitter_bound_secs(&[entry(1, Duration::from_millis(500))]), 1);
        assert_eq!(jitter_bound_secs(&[]), 1);
    }

    #[test]
    fn jitter_is_bounded_and_varies() {
        let batch = vec![entry(1, Duration::from_secs(60))];
        let bound = jitter_bound_secs(&batch);

        let mut rng = rand::rng();
        let seen: HashSet<u64> = (0..1000)
            .map(|_| rng.random_range(1..=bound))
            .inspect(|jitter| assert!((1..=60).contains(jitter)))
            .collect();

        assert!(seen.len() > 1);
    }
}
