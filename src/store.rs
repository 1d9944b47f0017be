//! In-memory holder for the latest complete raw snapshot. Reconciliation is
//! recomputed from a snapshot on every read; nothing derived is cached and
//! nothing is persisted across restarts.

use std::sync::{Arc, RwLock};

use crate::outbound::{RawAnalyticsRecord, RawPerformanceRecord, RawSegmentMeta};

#[derive(Clone, Debug, Default)]
pub(crate) struct RawSnapshot {
    pub(crate) meta: Vec<RawSegmentMeta>,
    pub(crate) performance: Vec<RawPerformanceRecord>,
    pub(crate) analytics: Vec<RawAnalyticsRecord>,
}

#[derive(Clone, Default)]
pub(crate) struct Store {
    inner: Arc<RwLock<RawSnapshot>>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Swaps in a freshly fetched snapshot. Partial fetch results never land
    /// here; the fetch loop only calls this once all three sources resolved.
    pub(crate) fn replace(&self, snapshot: RawSnapshot) {
        *self.inner.write().expect("snapshot lock poisoned") = snapshot;
    }

    pub(crate) fn snapshot(&self) -> RawSnapshot {
        self.inner.read().expect("snapshot lock poisoned").clone()
    }
}
