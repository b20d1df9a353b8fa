use std::ops::Range;
use std::sync::Arc;

use jobcache_model::{CompiledJob, Program};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::config::CacheConfig;
use crate::cache::error::{CacheError, MismatchReason, PersistenceError};
use crate::cache::key::StructuralKey;
use crate::cache::matcher::{Mapping, build_mapping};
use crate::cache::persist::{self, FileAdapter, PersistenceAdapter};
use crate::cache::stats::{CacheCounters, CacheStats};

/// One compiled submission and the per-slot mappings that let it be
/// re-parameterized. Slot `i` is sub-job `i` of `job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub job: CompiledJob,
    pub mappings: Vec<Mapping>,
    pub keys: Vec<StructuralKey>,
}

impl Chunk {
    pub fn slot_count(&self) -> usize {
        self.mappings.len()
    }

    /// Whether the first `programs.len()` slots were built from programs
    /// structurally identical to `programs`.
    pub fn matches(&self, programs: &[Program]) -> bool {
        programs.len() <= self.slot_count()
            && programs
                .iter()
                .zip(&self.keys)
                .all(|(program, key)| StructuralKey::of(program) == *key)
    }

    /// Checks the per-slot invariants: one sub-job, mapping and key per slot,
    /// and every mapping a valid bijection onto its sub-job.
    pub fn verify(&self) -> Result<(), CacheError> {
        let sub_jobs = self.job.sub_jobs.len();
        if sub_jobs != self.mappings.len() || sub_jobs != self.keys.len() {
            return Err(CacheError::StructuralMismatch {
                slot: 0,
                reason: MismatchReason::SlotCount {
                    sub_jobs,
                    programs: self.mappings.len(),
                },
            });
        }
        self.mappings
            .iter()
            .zip(&self.job.sub_jobs)
            .enumerate()
            .try_for_each(|(slot, (mapping, sub_job))| mapping.verify(slot, sub_job))
    }

    /// Fills slots up to `count` with copies of slot 0.
    fn grow(&mut self, chunk: usize, count: usize) -> Result<usize, CacheError> {
        let current = self.slot_count();
        if current >= count {
            return Ok(0);
        }
        if current == 0 {
            return Err(CacheError::CacheMiss { chunk });
        }
        let sub_job = self.job.sub_jobs[0].clone();
        let mapping = self.mappings[0].clone();
        let key = self.keys[0].clone();
        let added = count - current;
        self.job.sub_jobs.resize(count, sub_job);
        self.mappings.resize(count, mapping);
        self.keys.resize(count, key);
        Ok(added)
    }
}

/// Result of [`JobCache::lookup`].
#[derive(Debug)]
pub enum Lookup<'a> {
    Hit(&'a Chunk),
    Miss,
}

impl Lookup<'_> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Structural compilation cache, one entry per chunk index.
///
/// The store is plain owned state. Lookups and safe-mode patches take `&self`
/// and may run in parallel; everything that changes the chunk list takes
/// `&mut self`. Wrap it in [`SharedJobCache`] to share it across threads.
pub struct JobCache {
    pub(crate) config: CacheConfig,
    pub(crate) chunks: Vec<Option<Chunk>>,
    pub(crate) counters: CacheCounters,
    persistence: Option<Box<dyn PersistenceAdapter>>,
}

pub type SharedJobCache = Arc<RwLock<JobCache>>;

impl JobCache {
    /// Creates the store, loading from `config.persistence_target` when set.
    pub fn new(config: CacheConfig) -> Self {
        let adapter = config
            .persistence_target
            .clone()
            .map(|path| Box::new(FileAdapter::new(path)) as Box<dyn PersistenceAdapter>);
        Self::build(config, adapter)
    }

    pub fn with_adapter(config: CacheConfig, adapter: impl PersistenceAdapter + 'static) -> Self {
        Self::build(config, Some(Box::new(adapter)))
    }

    fn build(config: CacheConfig, persistence: Option<Box<dyn PersistenceAdapter>>) -> Self {
        let mut cache = Self {
            config,
            chunks: Vec::new(),
            counters: CacheCounters::default(),
            persistence,
        };
        cache.reload();
        cache
    }

    pub fn into_shared(self) -> SharedJobCache {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index).and_then(Option::as_ref)
    }

    /// Number of chunk indices currently holding a chunk.
    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.chunks.iter().flatten().map(Chunk::slot_count).sum();
        self.counters.snapshot(self.chunk_count(), slots)
    }

    /// Hit when `chunk` is cached, has room for every program and each slot
    /// was built from a program with the same structural key.
    pub fn lookup(&self, chunk: usize, programs: &[Program]) -> Lookup<'_> {
        match self.chunk(chunk) {
            Some(stored) if stored.matches(programs) => {
                self.counters.record_hit();
                Lookup::Hit(stored)
            }
            _ => {
                self.counters.record_miss();
                debug!(chunk, programs = programs.len(), "cache miss");
                Lookup::Miss
            }
        }
    }

    /// Stores `job`, compiled from `programs`, at `chunk`, replacing whatever
    /// was there. If any slot fails to match, nothing is stored.
    pub fn insert(
        &mut self,
        chunk: usize,
        mut job: CompiledJob,
        programs: &[Program],
    ) -> Result<(), CacheError> {
        self.check_limit(chunk, programs.len())?;
        if job.sub_jobs.len() != programs.len() {
            return Err(CacheError::StructuralMismatch {
                slot: programs.len().min(job.sub_jobs.len()),
                reason: MismatchReason::SlotCount {
                    sub_jobs: job.sub_jobs.len(),
                    programs: programs.len(),
                },
            });
        }

        // Collected in slot order so the lowest failing slot is the one reported.
        let mappings = programs
            .par_iter()
            .zip(job.sub_jobs.par_iter())
            .enumerate()
            .map(|(slot, (program, sub_job))| build_mapping(slot, program, sub_job))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        let keys = programs.par_iter().map(StructuralKey::of).collect();

        for sub_job in &mut job.sub_jobs {
            sub_job.listing = None;
        }

        let slots = mappings.len();
        self.place(chunk, Chunk { job, mappings, keys });
        self.counters.record_insert();
        info!(chunk, slots, "compiled job cached");

        self.persist();
        Ok(())
    }

    /// Makes `chunk` able to serve `program_count` programs without a new
    /// compile, by duplicating chunk 0 into an absent chunk and slot 0 into
    /// missing slots. Fails with `CacheMiss` when there is no template to
    /// copy or template reuse is disabled.
    ///
    /// Slot growth is not limited to chunk 0: any present chunk that is short
    /// of slots is filled from its own slot 0.
    pub fn ensure_capacity(&mut self, chunk: usize, program_count: usize) -> Result<(), CacheError> {
        self.check_limit(chunk, program_count)?;
        let reuse = self.config.reuse_across_chunks;

        if self.chunk(chunk).is_none() {
            let template = match self.chunk(0) {
                Some(template) if reuse => template,
                _ => return Err(CacheError::CacheMiss { chunk }),
            };
            let mut copy = template.clone();
            copy.grow(chunk, program_count)?;
            self.place(chunk, copy);
            self.counters.record_reuse();
            debug!(chunk, "chunk filled from chunk 0");
            return Ok(());
        }

        let Some(Some(target)) = self.chunks.get_mut(chunk) else {
            return Err(CacheError::CacheMiss { chunk });
        };
        if target.slot_count() >= program_count {
            return Ok(());
        }
        if !reuse {
            return Err(CacheError::CacheMiss { chunk });
        }
        let added = target.grow(chunk, program_count)?;
        self.counters.record_reuse();
        debug!(chunk, added, "slots filled from slot 0");
        Ok(())
    }

    /// Drops every chunk and resets the counters. The persisted blob is left
    /// alone until the next insert overwrites it.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.counters.reset();
        debug!("cache cleared");
    }

    /// Replaces the in-memory chunks with whatever the adapter holds. Any
    /// load failure leaves the cache empty.
    pub fn reload(&mut self) {
        self.chunks.clear();
        let Some(adapter) = &self.persistence else {
            return;
        };
        match adapter.load().and_then(|bytes| bytes.map(|b| persist::decode(&b)).transpose()) {
            Ok(Some(snapshot)) => {
                self.chunks = snapshot.chunks;
                info!(
                    source = %adapter.describe(),
                    chunks = self.chunk_count(),
                    "cache loaded"
                );
            }
            Ok(None) => debug!(source = %adapter.describe(), "no persisted cache"),
            Err(err) => warn!(
                source = %adapter.describe(),
                error = %err,
                "ignoring unreadable cache, starting empty"
            ),
        }
    }

    /// Serializes the current chunks; used by the store itself after every
    /// insert and by callers that persist through their own channel.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        persist::encode(&self.chunks)
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let snapshot = persist::decode(bytes)?;
        self.chunks = snapshot.chunks;
        Ok(())
    }

    fn persist(&self) {
        let Some(adapter) = &self.persistence else {
            return;
        };
        if let Err(err) = self.to_bytes().and_then(|bytes| adapter.save(&bytes)) {
            warn!(target_file = %adapter.describe(), error = %err, "failed to persist cache");
        }
    }

    fn place(&mut self, index: usize, chunk: Chunk) {
        if self.chunks.len() <= index {
            self.chunks.resize_with(index + 1, || None);
        }
        self.chunks[index] = Some(chunk);
    }

    fn check_limit(&self, chunk: usize, requested: usize) -> Result<(), CacheError> {
        let capacity = self.config.submission_size_limit;
        if requested > capacity {
            return Err(CacheError::ShapeMismatch {
                chunk,
                requested,
                capacity,
            });
        }
        Ok(())
    }
}

impl Default for JobCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for JobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field(
                "persistence",
                &self.persistence.as_ref().map(|adapter| adapter.describe()),
            )
            .finish()
    }
}

/// Splits `program_count` programs into chunk-sized ranges the way the
/// compiler partitions a batch: chunk `i` covers programs
/// `i * limit .. min((i + 1) * limit, program_count)`.
pub fn chunk_ranges(program_count: usize, limit: usize) -> Vec<(usize, Range<usize>)> {
    let limit = limit.max(1);
    (0..program_count)
        .step_by(limit)
        .enumerate()
        .map(|(chunk, start)| (chunk, start..(start + limit).min(program_count)))
        .collect()
}
