//! Re-parameterization of cached compiled jobs.
//!
//! Safe mode patches a private copy of the sub-jobs and never touches the
//! cached template. Fast mode rewrites the template itself and lends it out;
//! the exclusive borrow on the store stands in for the "do not touch this
//! chunk until the job is consumed" rule.
//!
//! Every slot is checked before the first parameter is written: the mapping
//! must still line up with the program, and the program must have the
//! structural key the slot was built from. A failed patch writes nothing in
//! either mode.

use std::borrow::Cow;

use jobcache_model::{ParamValue, Program, Structural, SubJob};
use tracing::trace;

use crate::cache::config::PatchMode;
use crate::cache::error::{CacheError, MismatchReason};
use crate::cache::key::StructuralKey;
use crate::cache::matcher::Mapping;
use crate::cache::store::{Chunk, JobCache};

/// A patched job ready to hand to the execution backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableJob<'a> {
    chunk: usize,
    backend: Cow<'a, str>,
    sub_jobs: Cow<'a, [SubJob]>,
}

impl<'a> ExecutableJob<'a> {
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn sub_jobs(&self) -> &[SubJob] {
        &self.sub_jobs
    }

    /// True when this job is a view of the cached template (fast mode).
    pub fn is_borrowed(&self) -> bool {
        matches!(self.sub_jobs, Cow::Borrowed(_))
    }

    pub fn into_owned(self) -> ExecutableJob<'static> {
        ExecutableJob {
            chunk: self.chunk,
            backend: Cow::Owned(self.backend.into_owned()),
            sub_jobs: Cow::Owned(self.sub_jobs.into_owned()),
        }
    }
}

impl JobCache {
    /// Patches `programs` into the chunk using the configured [`PatchMode`].
    pub fn patch(&mut self, chunk: usize, programs: &[Program]) -> Result<ExecutableJob<'_>, CacheError> {
        match self.config.mode() {
            PatchMode::Safe => self.patch_copy(chunk, programs),
            PatchMode::Fast => self.patch_in_place(chunk, programs),
        }
    }

    /// Safe mode: the template is cloned before any parameter is written, so
    /// a failure leaves nothing observable and concurrent callers holding
    /// `&self` never see each other's parameters.
    pub fn patch_copy(&self, chunk: usize, programs: &[Program]) -> Result<ExecutableJob<'static>, CacheError> {
        let stored = ready_chunk(self.chunk(chunk), chunk, programs.len())?;
        let mut sub_jobs = stored.job.sub_jobs[..programs.len()].to_vec();
        check_slots(&sub_jobs, &stored.mappings, &stored.keys, programs)?;
        write_slots(&mut sub_jobs, &stored.mappings, programs);
        self.counters.record_patch();
        trace!(chunk, slots = programs.len(), "patched copy");

        Ok(ExecutableJob {
            chunk,
            backend: Cow::Owned(stored.job.backend.clone()),
            sub_jobs: Cow::Owned(sub_jobs),
        })
    }

    /// Fast mode: rewrites the cached template and returns a view of its
    /// first `programs.len()` sub-jobs.
    pub fn patch_in_place(&mut self, chunk: usize, programs: &[Program]) -> Result<ExecutableJob<'_>, CacheError> {
        let Some(Some(stored)) = self.chunks.get_mut(chunk) else {
            return Err(CacheError::CacheMiss { chunk });
        };
        if programs.len() > stored.slot_count() {
            return Err(CacheError::ShapeMismatch {
                chunk,
                requested: programs.len(),
                capacity: stored.slot_count(),
            });
        }

        let sub_jobs = &mut stored.job.sub_jobs[..programs.len()];
        check_slots(sub_jobs, &stored.mappings, &stored.keys, programs)?;
        write_slots(sub_jobs, &stored.mappings, programs);
        self.counters.record_patch();
        trace!(chunk, slots = programs.len(), "patched in place");

        Ok(ExecutableJob {
            chunk,
            backend: Cow::Borrowed(stored.job.backend.as_str()),
            sub_jobs: Cow::Borrowed(&*sub_jobs),
        })
    }
}

fn ready_chunk(stored: Option<&Chunk>, chunk: usize, requested: usize) -> Result<&Chunk, CacheError> {
    let stored = stored.ok_or(CacheError::CacheMiss { chunk })?;
    if requested > stored.slot_count() {
        return Err(CacheError::ShapeMismatch {
            chunk,
            requested,
            capacity: stored.slot_count(),
        });
    }
    Ok(stored)
}

fn check_slots(
    sub_jobs: &[SubJob],
    mappings: &[Mapping],
    keys: &[StructuralKey],
    programs: &[Program],
) -> Result<(), CacheError> {
    for (slot, ((sub_job, mapping), program)) in sub_jobs.iter().zip(mappings).zip(programs).enumerate() {
        check_slot(slot, sub_job, mapping, program)?;

        let found = StructuralKey::of(program);
        if let Some(expected) = keys.get(slot).filter(|expected| **expected != found) {
            return Err(CacheError::StructuralMismatch {
                slot,
                reason: MismatchReason::StructureChanged {
                    expected: expected.to_string(),
                    found: found.to_string(),
                },
            });
        }
    }
    Ok(())
}

fn check_slot(slot: usize, sub_job: &SubJob, mapping: &Mapping, program: &Program) -> Result<(), CacheError> {
    let operations = program.unrolled();
    let mismatch = |reason| CacheError::StructuralMismatch { slot, reason };
    let len = sub_job.instructions.len();

    for entry in mapping.iter() {
        let instruction = sub_job.instructions.get(entry.instruction).ok_or_else(|| {
            mismatch(MismatchReason::InstructionOutOfRange {
                instruction: entry.instruction,
                len,
            })
        })?;
        let operation = operations.get(entry.operation).ok_or_else(|| {
            mismatch(MismatchReason::OperationOutOfRange {
                operation: entry.operation,
                len: operations.len(),
            })
        })?;

        if !instruction.same_shape(*operation) {
            return Err(mismatch(MismatchReason::SignatureChanged {
                instruction: entry.instruction,
                operation: entry.operation,
                expected: operation.signature().to_string(),
                found: instruction.signature().to_string(),
            }));
        }
        if instruction.params.len() != operation.params.len() {
            return Err(CacheError::ParameterArityMismatch {
                slot,
                instruction: entry.instruction,
                signature: instruction.signature().to_string(),
                compiled: instruction.params.len(),
                expected: operation.params.len(),
            });
        }
    }
    Ok(())
}

/// Only called after `check_slots` accepted the same inputs.
fn write_slots(sub_jobs: &mut [SubJob], mappings: &[Mapping], programs: &[Program]) {
    for ((sub_job, mapping), program) in sub_jobs.iter_mut().zip(mappings).zip(programs) {
        let operations = program.unrolled();
        for entry in mapping.iter() {
            let (Some(instruction), Some(operation)) =
                (sub_job.instructions.get_mut(entry.instruction), operations.get(entry.operation))
            else {
                continue;
            };
            for (target, value) in instruction.params.iter_mut().zip(&operation.params) {
                *target = ParamValue::to_f64(*value);
            }
        }
        sub_job.name = program.name().to_string();
    }
}

#[cfg(test)]
mod tests {
    use jobcache_model::{CompiledInstruction, CompiledJob, NO_PARAMS, Operation, TypeTag};

    use super::*;
    use crate::cache::config::CacheConfig;

    fn program(name: &str, a: f64, b: i64) -> Program {
        Program::from_operations(
            name,
            vec![
                Operation::new(TypeTag::Rz, vec![0], [a]),
                Operation::new(TypeTag::Cx, vec![0, 1], NO_PARAMS),
                Operation::new(TypeTag::U1, vec![1], [b]),
            ],
        )
    }

    fn job() -> CompiledJob {
        CompiledJob::new(
            "local",
            vec![SubJob::new(
                "compiled",
                vec![
                    CompiledInstruction::new(TypeTag::Rz, vec![0], vec![0.0]),
                    CompiledInstruction::new(TypeTag::Cx, vec![0, 1], vec![]),
                    CompiledInstruction::new(TypeTag::U1, vec![1], vec![0.0]),
                ],
            )],
        )
    }

    fn cache_with(mode: PatchMode) -> JobCache {
        let mut cache = JobCache::new(CacheConfig::default().with_mode(mode));
        cache.insert(0, job(), &[program("seed", 0.0, 0)]).unwrap();
        cache
    }

    #[test]
    fn safe_patch_leaves_template_untouched() {
        let mut cache = cache_with(PatchMode::Safe);
        let patched = cache.patch(0, &[program("iter", 0.75, 2)]).unwrap().into_owned();

        assert!(!patched.is_borrowed());
        assert_eq!(patched.sub_jobs()[0].name, "iter");
        assert_eq!(patched.sub_jobs()[0].instructions[0].params, vec![0.75]);
        assert_eq!(patched.sub_jobs()[0].instructions[2].params, vec![2.0]);

        let template = &cache.chunk(0).unwrap().job.sub_jobs[0];
        assert_eq!(template.instructions[0].params, vec![0.0]);
        assert_eq!(template.name, "compiled");
    }

    #[test]
    fn fast_patch_rewrites_template() {
        let mut cache = cache_with(PatchMode::Fast);
        {
            let patched = cache.patch(0, &[program("iter", 1.5, 3)]).unwrap();
            assert!(patched.is_borrowed());
            assert_eq!(patched.backend(), "local");
            assert_eq!(patched.chunk(), 0);
        }
        let template = &cache.chunk(0).unwrap().job.sub_jobs[0];
        assert_eq!(template.instructions[0].params, vec![1.5]);
        assert_eq!(template.name, "iter");
    }

    #[test]
    fn patch_of_absent_chunk_is_a_miss() {
        let mut cache = cache_with(PatchMode::Safe);
        let err = cache.patch(4, &[program("iter", 0.1, 1)]).unwrap_err();
        assert!(err.is_miss());

        let mut fast = cache_with(PatchMode::Fast);
        assert_eq!(
            fast.patch(4, &[program("iter", 0.1, 1)]).unwrap_err(),
            CacheError::CacheMiss { chunk: 4 }
        );
    }

    #[test]
    fn oversized_batch_is_shape_mismatch() {
        for mode in [PatchMode::Safe, PatchMode::Fast] {
            let mut cache = cache_with(mode);
            let programs = [program("a", 0.1, 1), program("b", 0.2, 2)];
            assert_eq!(
                cache.patch(0, &programs).unwrap_err(),
                CacheError::ShapeMismatch {
                    chunk: 0,
                    requested: 2,
                    capacity: 1
                }
            );
        }
    }

    #[test]
    fn arity_change_aborts_safe_patch() {
        let cache = cache_with(PatchMode::Safe);
        let widened = Program::from_operations(
            "wide",
            vec![
                Operation::new(TypeTag::Rz, vec![0], [0.1, 0.2]),
                Operation::new(TypeTag::Cx, vec![0, 1], NO_PARAMS),
                Operation::new(TypeTag::U1, vec![1], [1]),
            ],
        );

        let err = cache.patch_copy(0, &[widened]).unwrap_err();
        assert_eq!(
            err,
            CacheError::ParameterArityMismatch {
                slot: 0,
                instruction: 0,
                signature: "rz[0]".into(),
                compiled: 1,
                expected: 2,
            }
        );
        assert_eq!(cache.chunk(0).unwrap().job.sub_jobs[0].instructions[0].params, vec![0.0]);
    }

    #[test]
    fn changed_operand_is_structural_mismatch() {
        let cache = cache_with(PatchMode::Safe);
        let moved = Program::from_operations(
            "moved",
            vec![
                Operation::new(TypeTag::Rz, vec![1], [0.1]),
                Operation::new(TypeTag::Cx, vec![0, 1], NO_PARAMS),
                Operation::new(TypeTag::U1, vec![1], [1]),
            ],
        );

        let err = cache.patch_copy(0, &[moved]).unwrap_err();
        assert!(matches!(
            err,
            CacheError::StructuralMismatch {
                reason: MismatchReason::SignatureChanged { instruction: 0, operation: 0, .. },
                ..
            }
        ));
    }

    #[test]
    fn truncated_program_is_structural_mismatch() {
        let cache = cache_with(PatchMode::Safe);
        let short = Program::from_operations("short", vec![Operation::new(TypeTag::Rz, vec![0], [0.1])]);

        let err = cache.patch_copy(0, &[short]).unwrap_err();
        assert!(matches!(
            err,
            CacheError::StructuralMismatch {
                reason: MismatchReason::OperationOutOfRange { operation: 2, len: 1 },
                ..
            }
        ));
    }

    #[test]
    fn extra_parameterized_operation_is_rejected() {
        let extended = Program::from_operations(
            "extended",
            vec![
                Operation::new(TypeTag::Rz, vec![0], [0.5]),
                Operation::new(TypeTag::Cx, vec![0, 1], NO_PARAMS),
                Operation::new(TypeTag::U1, vec![1], [1]),
                Operation::new(TypeTag::Rx, vec![1], [0.9]),
            ],
        );

        for mode in [PatchMode::Safe, PatchMode::Fast] {
            let mut cache = cache_with(mode);
            let err = cache.patch(0, std::slice::from_ref(&extended)).unwrap_err();
            assert!(matches!(
                err,
                CacheError::StructuralMismatch {
                    slot: 0,
                    reason: MismatchReason::StructureChanged { .. },
                }
            ));
            assert_eq!(cache.stats().patches, 0);
        }
    }

    #[test]
    fn failed_fast_patch_writes_nothing() {
        let mut cache = JobCache::new(CacheConfig::default().with_mode(PatchMode::Fast));
        let seeds = [program("s0", 0.0, 0), program("s1", 0.0, 0)];
        let two = CompiledJob::new("local", vec![job().sub_jobs[0].clone(), job().sub_jobs[0].clone()]);
        cache.insert(0, two, &seeds).unwrap();

        let short = Program::from_operations("short", vec![Operation::new(TypeTag::Rz, vec![0], [0.1])]);
        let err = cache.patch(0, &[program("ok", 0.7, 4), short]).unwrap_err();
        assert!(matches!(err, CacheError::StructuralMismatch { slot: 1, .. }));

        let template = &cache.chunk(0).unwrap().job.sub_jobs[0];
        assert_eq!(template.instructions[0].params, vec![0.0]);
        assert_eq!(template.name, "compiled");
    }

    #[test]
    fn patch_counts_are_recorded() {
        let cache = cache_with(PatchMode::Safe);
        cache.patch_copy(0, &[program("a", 0.1, 1)]).unwrap();
        cache.patch_copy(0, &[program("b", 0.2, 2)]).unwrap();
        assert_eq!(cache.stats().patches, 2);
    }
}
