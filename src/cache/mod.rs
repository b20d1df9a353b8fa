//! Structural compilation cache.
//!
//! A typical optimization loop looks like this:
//!
//! 1. `ensure_capacity(chunk, n)` so chunk 0 can stand in for later chunks
//!    (a `CacheMiss` here just means there is nothing to copy yet);
//! 2. `lookup(chunk, programs)`; on a miss, compile externally and `insert`;
//! 3. `patch(chunk, programs)` and hand the result to the backend.

pub mod config;
pub mod error;
pub mod key;
pub mod matcher;
pub mod patcher;
pub mod path;
pub mod persist;
pub mod stats;
pub mod store;

pub use config::{CacheConfig, PatchMode};
pub use error::{CacheError, MismatchReason, PersistenceError};
pub use key::StructuralKey;
pub use matcher::{MapEntry, Mapping, build_mapping};
pub use patcher::ExecutableJob;
pub use path::{cache_root, default_cache_file};
pub use persist::{CacheSnapshot, FileAdapter, MemoryAdapter, PersistenceAdapter};
pub use stats::CacheStats;
pub use store::{Chunk, JobCache, Lookup, SharedJobCache, chunk_ranges};
