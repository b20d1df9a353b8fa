use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    template_reuses: AtomicU64,
    patches: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reuse(&self) {
        self.template_reuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_patch(&self) {
        self.patches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.inserts,
            &self.template_reuses,
            &self.patches,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, chunks: usize, slots: usize) -> CacheStats {
        CacheStats {
            chunks,
            slots,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            template_reuses: self.template_reuses.load(Ordering::Relaxed),
            patches: self.patches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the store's size and traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub chunks: usize,
    pub slots: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Chunks or slots filled by duplicating an existing template.
    pub template_reuses: u64,
    pub patches: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
