//! ValueStore: latest record per source plus derived reference values.
//!
//! Every mutation recomputes `Derived` from scratch and synchronously notifies
//! listeners. Reserved target ids never contribute to the reference.
//! Sources registered as swapped list their sides in the opposite order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::config::TargetIds;
use crate::core::types::{Derived, Snapshot, SourceRecord};
use crate::error::AppError;

/// Listener invoked with the snapshot after every mutation
pub type Listener = Box<dyn FnMut(&Snapshot) + Send>;

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct ValueStore {
    snapshot: Snapshot,
    targets: TargetIds,
    swapped: BTreeSet<String>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl ValueStore {
    pub fn new(targets: TargetIds) -> Self {
        Self {
            snapshot: Snapshot::default(),
            targets,
            swapped: BTreeSet::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Insert or overwrite the record for its source id.
    pub fn upsert(&mut self, record: SourceRecord) -> Result<(), AppError> {
        if record.source_id.trim().is_empty() {
            return Err(AppError::InvalidRecord("empty source id".to_string()));
        }
        trace!(source = %record.source_id, sides = ?record.sides, frozen = record.frozen, "upsert");
        self.snapshot.records.insert(record.source_id.clone(), record);
        self.recompute();
        self.notify();
        Ok(())
    }

    /// Remove a source. Returns whether it was present.
    pub fn remove(&mut self, source_id: &str) -> bool {
        let removed = self.snapshot.records.remove(source_id).is_some();
        if removed {
            debug!(source = source_id, "Source removed");
            self.recompute();
            self.notify();
        }
        removed
    }

    /// Replace the set of side-swapped sources. Blank ids are skipped.
    ///
    /// Returns whether the set changed; only a change recomputes and notifies.
    pub fn set_swapped<I, S>(&mut self, source_ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: BTreeSet<String> = source_ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if next == self.swapped {
            return false;
        }
        debug!(swapped = ?next, "Swapped sources updated");
        self.swapped = next;
        self.recompute();
        self.notify();
        true
    }

    pub fn swapped(&self) -> &BTreeSet<String> {
        &self.swapped
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn targets(&self) -> &TargetIds {
        &self.targets
    }

    /// Register a listener. It is called once immediately with the current snapshot.
    pub fn subscribe(&mut self, mut listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        listener(&self.snapshot);
        self.listeners.push((id, listener));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn recompute(&mut self) {
        self.snapshot.derived =
            compute_derived(&self.snapshot.records, &self.targets, &self.swapped);
    }

    fn notify(&mut self) {
        let snapshot = &self.snapshot;
        for (_, listener) in self.listeners.iter_mut() {
            listener(snapshot);
        }
    }
}

/// Reference values from records that are not frozen, not reserved targets,
/// and numeric on both sides. Swapped sources contribute their sides reversed.
pub fn compute_derived(
    records: &BTreeMap<String, SourceRecord>,
    targets: &TargetIds,
    swapped: &BTreeSet<String>,
) -> Derived {
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    let mut qualifying = 0usize;

    for record in records.values() {
        if record.frozen || targets.is_reserved(&record.source_id) {
            continue;
        }
        let Some(mut values) = record.values() else {
            continue;
        };
        if swapped.contains(&record.source_id) {
            values.swap(0, 1);
        }
        qualifying += 1;
        for i in 0..2 {
            min[i] = min[i].min(values[i]);
            max[i] = max[i].max(values[i]);
        }
    }

    if qualifying == 0 {
        return Derived::default();
    }

    let reference = [(min[0] + max[0]) / 2.0, (min[1] + max[1]) / 2.0];
    let overround = 1.0 / max[0] + 1.0 / max[1];
    let spread_pct = if overround < 1.0 {
        (1.0 - overround) * 100.0
    } else {
        0.0
    };

    Derived {
        reference: Some(reference),
        spread_pct: Some(spread_pct),
    }
}
