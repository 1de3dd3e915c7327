//! Time ordered queue of pending metric collections.
//!
//! Entries are ordered by their [`OrderKey`], `(next collection, resource,
//! metric name, schedule id)`. Identity, used for replacement and removal, is
//! a separate [`ScheduleKey`], `(schedule id, resource, metric name)`, that
//! ignores timing.
//!
//! A batch handed out for collection is out of the queue until it is
//! rescheduled. Scheduling or unscheduling one of its entries in the meantime
//! supersedes it, and the stale entry is dropped instead of being put back.

use crate::debug;
use crate::measurement::{MeasurementScheduleRequest, ResourceId, ScheduleId};

use std::collections::{BTreeMap, HashMap, HashSet};

mod entry;

pub use entry::{OrderKey, ScheduleKey, ScheduledMeasurement};

#[derive(Default)]
pub struct ScheduleQueue {
    entries: BTreeMap<OrderKey, ScheduledMeasurement>,
    index: HashMap<ScheduleKey, OrderKey>,
    // handed out and not yet rescheduled
    in_flight: HashSet<ScheduleKey>,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule every request for `resource_id` with a first collection at
    /// `first_collection`. All requests share that time so metrics that are
    /// collected together stay together. Existing entries with the same
    /// identity are replaced; disabled requests are only removed.
    pub fn schedule<I>(&mut self, resource_id: ResourceId, requests: I, first_collection: u64)
    where
        I: IntoIterator<Item = MeasurementScheduleRequest>,
    {
        for request in requests {
            let entry = ScheduledMeasurement::new(resource_id, request, first_collection);

            self.remove(&entry.key());

            if !entry.request().enabled() {
                continue;
            }

            if entry.interval_millis() == 0 {
                debug!("not scheduling {entry}: zero collection interval");
                continue;
            }

            self.insert(entry);
        }
    }

    /// Insert an entry, replacing any existing entry with the same identity.
    pub fn insert(&mut self, entry: ScheduledMeasurement) {
        let key = entry.key();
        self.in_flight.remove(&key);
        if let Some(previous) = self.index.remove(&key) {
            self.entries.remove(&previous);
        }

        let order = entry.order_key();
        self.index.insert(key, order.clone());
        self.entries.insert(order, entry);
    }

    /// Remove the entry with the given identity. An in-flight entry with that
    /// identity will not be put back.
    pub fn remove(&mut self, key: &ScheduleKey) -> Option<ScheduledMeasurement> {
        self.in_flight.remove(key);
        let order = self.index.remove(key)?;
        self.entries.remove(&order)
    }

    /// Remove every entry belonging to one of the given resources, including
    /// entries currently being collected. Returns the number of entries
    /// removed.
    pub fn unschedule(&mut self, resource_ids: &HashSet<ResourceId>) -> usize {
        let before = self.entries.len() + self.in_flight.len();

        self.entries
            .retain(|_, entry| !resource_ids.contains(&entry.resource_id()));
        self.index
            .retain(|key, _| !resource_ids.contains(&key.resource_id));
        self.in_flight
            .retain(|key| !resource_ids.contains(&key.resource_id));

        before - (self.entries.len() + self.in_flight.len())
    }

    /// The earliest next collection time, if any entry is scheduled.
    pub fn peek_next_due(&self) -> Option<u64> {
        self.entries
            .first_key_value()
            .map(|(_, entry)| entry.next_collection())
    }

    /// Remove and return the co-scheduled batch at the head of the queue:
    /// every entry sharing the earliest entry's resource and exact due time.
    /// Returns an empty batch when the head is not yet due at `now`.
    pub fn next_due_batch(&mut self, now: u64) -> Vec<ScheduledMeasurement> {
        let (resource_id, due) = match self.entries.first_key_value() {
            Some((_, first)) if first.next_collection() <= now => {
                (first.resource_id(), first.next_collection())
            }
            _ => return Vec::new(),
        };

        let mut batch = Vec::new();

        while let Some(entry) = self.entries.first_entry() {
            let head = entry.get();
            if head.resource_id() != resource_id || head.next_collection() != due {
                break;
            }

            let entry = entry.remove();
            let key = entry.key();
            self.index.remove(&key);
            self.in_flight.insert(key);
            batch.push(entry);
        }

        batch
    }

    /// Put a collected batch back, each entry advanced by its own interval.
    /// Entries superseded while in flight are dropped.
    pub fn reschedule(&mut self, batch: Vec<ScheduledMeasurement>) {
        for mut entry in batch {
            if self.land(&entry) {
                entry.advance();
                self.insert(entry);
            }
        }
    }

    /// Put a batch back with every entry due at `next_collection`. Entries
    /// superseded while in flight are dropped.
    pub fn reschedule_at(&mut self, batch: Vec<ScheduledMeasurement>, next_collection: u64) {
        for mut entry in batch {
            if self.land(&entry) {
                entry.set_next_collection(next_collection);
                self.insert(entry);
            }
        }
    }

    fn land(&mut self, entry: &ScheduledMeasurement) -> bool {
        if self.in_flight.remove(&entry.key()) {
            true
        } else {
            debug!("dropping {entry}: superseded during collection");
            false
        }
    }

    /// Remove entries whose schedule id is already used by an earlier-due
    /// entry. Returns the number of entries removed.
    pub fn remove_duplicate_schedules(&mut self) -> usize {
        let mut seen: HashSet<ScheduleId> = HashSet::with_capacity(self.entries.len());
        let mut duplicates = Vec::new();

        for entry in self.entries.values() {
            if !seen.insert(entry.schedule_id()) {
                debug!("found duplicate schedule - will remove it: {entry}");
                duplicates.push(entry.key());
            }
        }

        for key in &duplicates {
            self.remove(key);
        }

        duplicates.len()
    }

    /// Iterate over entries in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledMeasurement> {
        self.entries.values()
    }

    pub fn contains(&self, key: &ScheduleKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries handed out for collection and not yet put back.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::DataKind;
    use std::time::Duration;

    fn request(id: ScheduleId, name: &str, interval_ms: u64) -> MeasurementScheduleRequest {
        MeasurementScheduleRequest::new(
            id,
            name,
            Duration::from_millis(interval_ms),
            DataKind::NumericAbsolute,
        )
    }

    #[test]
    fn batches_come_out_in_time_order() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(3, vec![request(30, "c", 1000)], 300);
        queue.schedule(1, vec![request(10, "a", 1000), request(11, "b", 1000)], 100);
        queue.schedule(2, vec![request(20, "a", 1000)], 100);
        queue.schedule(4, vec![request(40, "d", 1000)], 50);

        let mut last = 0;
        let mut batches = Vec::new();
        loop {
            let batch = queue.next_due_batch(10_000);
            if batch.is_empty() {
                break;
            }

            let due = batch[0].next_collection();
            assert!(due >= last);
            last = due;

            assert!(batch
                .iter()
                .all(|e| e.resource_id() == batch[0].resource_id() && e.next_collection() == due));

            batches.push(batch.iter().map(|e| e.schedule_id()).collect::<Vec<_>>());
        }

        assert_eq!(batches, vec![vec![40], vec![10, 11], vec![20], vec![30]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn nothing_is_returned_before_it_is_due() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000)], 500);

        assert!(queue.next_due_batch(499).is_empty());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_next_due(), Some(500));
        assert_eq!(queue.next_due_batch(500).len(), 1);
        assert_eq!(queue.peek_next_due(), None);
    }

    #[test]
    fn batch_leaves_other_resources_untouched() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000)], 100);
        queue.schedule(2, vec![request(2, "a", 1000)], 100);
        queue.schedule(1, vec![request(3, "b", 1000)], 200);

        let batch = queue.next_due_batch(1000);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].schedule_id(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn rescheduling_same_identity_replaces_entry() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000)], 100);
        queue.schedule(1, vec![request(1, "a", 5000)], 900);

        assert_eq!(queue.len(), 1);
        let entry = queue.iter().next().unwrap();
        assert_eq!(entry.next_collection(), 900);
        assert_eq!(entry.interval_millis(), 5000);
    }

    #[test]
    fn disabled_request_removes_existing_entry() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000)], 100);
        queue.schedule(1, vec![request(1, "a", 1000).with_enabled(false)], 100);

        assert!(queue.is_empty());
    }

    #[test]
    fn zero_interval_is_not_scheduled() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 0)], 100);
        assert!(queue.is_empty());
    }

    #[test]
    fn unschedule_removes_all_entries_for_resources() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000), request(2, "b", 1000)], 100);
        queue.schedule(2, vec![request(3, "a", 1000)], 100);
        queue.schedule(3, vec![request(4, "a", 1000)], 100);

        let removed = queue.unschedule(&[1, 3].into_iter().collect());
        assert_eq!(removed, 3);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&ScheduleKey::new(3, 2, "a")));
        assert!(!queue.contains(&ScheduleKey::new(1, 1, "a")));
    }

    #[test]
    fn reschedule_advances_by_interval() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000), request(2, "b", 1000)], 100);

        let batch = queue.next_due_batch(100);
        queue.reschedule(batch);

        assert_eq!(queue.peek_next_due(), Some(1100));
        let entry = queue.iter().next().unwrap();
        assert_eq!(entry.last_collection(), Some(100));

        let batch = queue.next_due_batch(1100);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn reschedule_at_keeps_batch_together() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000), request(2, "b", 2000)], 100);

        let batch = queue.next_due_batch(100);
        queue.reschedule_at(batch, 5000);

        assert_eq!(queue.next_due_batch(5000).len(), 2);
    }

    #[test]
    fn duplicate_schedule_ids_keep_earliest() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(7, "a", 1000)], 100);
        // same schedule id under a different resource and name
        queue.schedule(2, vec![request(7, "b", 1000)], 200);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.remove_duplicate_schedules(), 1);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&ScheduleKey::new(7, 1, "a")));
    }

    #[test]
    fn collection_order_breaks_ties_on_resource_name_and_id() {
        let a = ScheduledMeasurement::new(1, request(2, "a", 1000), 100).order_key();
        let b = ScheduledMeasurement::new(1, request(1, "b", 1000), 100).order_key();
        let c = ScheduledMeasurement::new(2, request(0, "a", 1000), 100).order_key();
        let d = ScheduledMeasurement::new(1, request(3, "a", 1000), 100).order_key();

        assert!(a < b);
        assert!(b < c);
        assert!(a < d);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn identity_ignores_timing() {
        let a = ScheduledMeasurement::new(1, request(1, "a", 1000), 100);
        let b = ScheduledMeasurement::new(1, request(1, "a", 5000), 900);

        assert_eq!(a.key(), b.key());
        assert_ne!(a.order_key(), b.order_key());
    }

    #[test]
    fn unschedule_during_collection_is_not_undone() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000), request(2, "b", 1000)], 100);
        queue.schedule(2, vec![request(3, "a", 1000)], 100);

        let batch = queue.next_due_batch(100);
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.in_flight(), 2);

        assert_eq!(queue.unschedule(&HashSet::from([1])), 2);
        queue.reschedule(batch);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.in_flight(), 0);
        assert!(!queue.contains(&ScheduleKey::new(1, 1, "a")));
    }

    #[test]
    fn update_during_collection_wins_over_stale_entry() {
        let mut queue = ScheduleQueue::new();
        queue.schedule(1, vec![request(1, "a", 1000), request(2, "b", 1000)], 100);

        let batch = queue.next_due_batch(100);

        // new interval for one entry, the other disabled
        queue.schedule(
            1,
            vec![
                request(1, "a", 5000),
                request(2, "b", 1000).with_enabled(false),
            ],
            200,
        );
        queue.reschedule_at(batch, 9000);

        assert_eq!(queue.len(), 1);
        let entry = queue.iter().next().unwrap();
        assert_eq!(entry.interval_millis(), 5000);
        assert_eq!(entry.next_collection(), 200);
        assert_eq!(queue.in_flight(), 0);
    }
}
