//! Compile once, re-parameterize many times.
//!
//! `jobcache` remembers compiled jobs for structurally identical programs and
//! rewrites only their numeric parameters on later submissions. See
//! [`cache`] for the store, matcher and patcher.

pub mod cache;
pub mod cli;

pub use jobcache_model as model;

pub use cache::{CacheConfig, CacheError, ExecutableJob, JobCache, Lookup, PatchMode};
