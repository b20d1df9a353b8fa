use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the cache store, matcher and patcher.
///
/// None of these are retried internally: resubmitting the same input cannot
/// change the outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("structural mismatch in slot {slot}: {reason}")]
    StructuralMismatch { slot: usize, reason: MismatchReason },
    #[error("chunk {chunk} is not cached")]
    CacheMiss { chunk: usize },
    #[error("chunk {chunk} holds {capacity} program slots, {requested} were submitted")]
    ShapeMismatch {
        chunk: usize,
        requested: usize,
        capacity: usize,
    },
    #[error(
        "parameter arity mismatch in slot {slot} at instruction {instruction} (`{signature}`): \
         compiled form has {compiled}, program has {expected}"
    )]
    ParameterArityMismatch {
        slot: usize,
        instruction: usize,
        signature: String,
        compiled: usize,
        expected: usize,
    },
}

impl CacheError {
    /// `CacheMiss` is a control signal ("compile first"), not a failure.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::CacheMiss { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    #[error("compiled job has an extra `{signature}` instruction at position {instruction}")]
    ExtraInstruction {
        signature: String,
        instruction: usize,
    },
    #[error("program operation {operation} (`{signature}`) has no compiled counterpart")]
    MissingInstruction { signature: String, operation: usize },
    #[error("instruction {instruction} is `{found}` but mapped operation {operation} is `{expected}`")]
    SignatureChanged {
        instruction: usize,
        operation: usize,
        expected: String,
        found: String,
    },
    #[error("mapped operation {operation} is outside the program ({len} operations)")]
    OperationOutOfRange { operation: usize, len: usize },
    #[error("mapped instruction {instruction} is outside the sub-job ({len} instructions)")]
    InstructionOutOfRange { instruction: usize, len: usize },
    #[error("operation {operation} is mapped more than once")]
    DuplicateOperation { operation: usize },
    #[error("mapping covers {mapped} instructions, sub-job has {patchable} patchable ones")]
    MappingLength { mapped: usize, patchable: usize },
    #[error("program structure `{found}` differs from the cached `{expected}`")]
    StructureChanged { expected: String, found: String },
    #[error("compiled job has {sub_jobs} sub-jobs for {programs} programs")]
    SlotCount { sub_jobs: usize, programs: usize },
}

/// Load or save failure of a persisted cache blob. The store recovers from
/// these by logging and continuing with an empty cache.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read cache file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write cache file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode cache snapshot")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode cache snapshot")]
    Decode(#[source] serde_json::Error),
    #[error("cache snapshot has format version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
    #[error("cache snapshot chunk {chunk} is invalid: {reason}")]
    Invalid { chunk: usize, reason: CacheError },
}
