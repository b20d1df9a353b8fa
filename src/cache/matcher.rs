//! Correspondence between a source program and its compiled sub-job.
//!
//! Operations are grouped by [`Signature`] into FIFO queues in program order;
//! each compiled instruction then claims the front of its signature's queue.
//! This relies on a contract of the external compiler: operations that share
//! a signature keep their relative order through compilation. A compiler that
//! reorders same-signature operations produces a mapping that is accepted but
//! wrong, and nothing here can detect it.

use std::collections::VecDeque;

use ahash::AHashMap;
use jobcache_model::{Program, Signature, Structural, SubJob};
use serde::{Deserialize, Serialize};

use crate::cache::error::{CacheError, MismatchReason};

/// One patchable instruction and the source operation feeding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapEntry {
    pub instruction: usize,
    pub operation: usize,
}

/// Per-slot mapping from patchable compiled instructions to unrolled source
/// operations, in instruction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: Vec<MapEntry>,
}

impl Mapping {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapEntry> + '_ {
        self.entries.iter()
    }

    /// Source operation index for each patchable instruction, in order.
    pub fn source_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.operation).collect()
    }

    /// Checks that this mapping is usable against `sub_job`: every entry
    /// points at an existing patchable instruction in increasing order, no
    /// operation is claimed twice and every patchable instruction is covered.
    pub fn verify(&self, slot: usize, sub_job: &SubJob) -> Result<(), CacheError> {
        let mismatch = |reason| CacheError::StructuralMismatch { slot, reason };
        let len = sub_job.instructions.len();
        let mut seen = ahash::AHashSet::with_capacity(self.entries.len());
        let mut previous = None;

        for entry in &self.entries {
            let in_order = previous.is_none_or(|prev| entry.instruction > prev);
            let patchable = sub_job
                .instructions
                .get(entry.instruction)
                .is_some_and(|inst| inst.is_patchable());
            if !in_order || !patchable {
                return Err(mismatch(MismatchReason::InstructionOutOfRange {
                    instruction: entry.instruction,
                    len,
                }));
            }
            if !seen.insert(entry.operation) {
                return Err(mismatch(MismatchReason::DuplicateOperation {
                    operation: entry.operation,
                }));
            }
            previous = Some(entry.instruction);
        }

        let patchable = sub_job.patchable_count();
        if patchable != self.entries.len() {
            return Err(mismatch(MismatchReason::MappingLength {
                mapped: self.entries.len(),
                patchable,
            }));
        }
        Ok(())
    }
}

/// Builds the mapping for one program slot.
///
/// Instructions that carry no parameters (and whose source operation carries
/// none either) are left out of the mapping, but still consume their queue
/// entry so a missing or surplus marker is reported like any other mismatch.
pub fn build_mapping(slot: usize, program: &Program, sub_job: &SubJob) -> Result<Mapping, CacheError> {
    let operations = program.unrolled();
    let mismatch = |reason| CacheError::StructuralMismatch { slot, reason };

    let mut queues: AHashMap<Signature, VecDeque<usize>> = AHashMap::new();
    for (index, op) in operations.iter().enumerate() {
        queues.entry(op.signature()).or_default().push_back(index);
    }

    let mut entries = Vec::with_capacity(sub_job.patchable_count());
    for (position, instruction) in sub_job.instructions.iter().enumerate() {
        let signature = instruction.signature();
        let Some(operation) = queues.get_mut(&signature).and_then(VecDeque::pop_front) else {
            return Err(mismatch(MismatchReason::ExtraInstruction {
                signature: signature.to_string(),
                instruction: position,
            }));
        };

        let expected = operations[operation].parameter_count();
        let compiled = instruction.parameter_count();
        if expected != compiled {
            return Err(CacheError::ParameterArityMismatch {
                slot,
                instruction: position,
                signature: signature.to_string(),
                compiled,
                expected,
            });
        }

        if compiled > 0 {
            entries.push(MapEntry {
                instruction: position,
                operation,
            });
        }
    }

    // Report the earliest leftover operation so the error is deterministic.
    let leftover = queues
        .iter()
        .filter_map(|(signature, queue)| queue.front().map(|&operation| (operation, signature)))
        .min_by_key(|(operation, _)| *operation);
    if let Some((operation, signature)) = leftover {
        return Err(mismatch(MismatchReason::MissingInstruction {
            signature: signature.to_string(),
            operation,
        }));
    }

    Ok(Mapping { entries })
}

#[cfg(test)]
mod tests {
    use jobcache_model::{CompiledInstruction, NO_PARAMS, Operation, TypeTag};

    use super::*;

    fn op(tag: TypeTag, operands: &[usize], params: &[f64]) -> Operation {
        Operation::new(tag, operands.to_vec(), params.iter().copied())
    }

    fn inst(tag: TypeTag, operands: &[usize], params: &[f64]) -> CompiledInstruction {
        CompiledInstruction::new(tag, operands.to_vec(), params.to_vec())
    }

    #[test]
    fn order_preserving_compile_maps_identity() {
        let program = Program::from_operations(
            "p",
            vec![
                op(TypeTag::Rz, &[0], &[0.1]),
                op(TypeTag::Crz, &[0, 1], &[0.2]),
                op(TypeTag::Rz, &[0], &[0.3]),
            ],
        );
        let sub = SubJob::new(
            "p",
            vec![
                inst(TypeTag::Rz, &[0], &[0.0]),
                inst(TypeTag::Crz, &[0, 1], &[0.0]),
                inst(TypeTag::Rz, &[0], &[0.0]),
            ],
        );

        let mapping = build_mapping(0, &program, &sub).unwrap();
        assert_eq!(mapping.source_indices(), vec![0, 1, 2]);
        assert!(mapping.verify(0, &sub).is_ok());
    }

    #[test]
    fn interleaved_compile_follows_fifo_per_signature() {
        let program = Program::from_operations(
            "p",
            vec![
                op(TypeTag::Rx, &[0], &[1.0]),
                op(TypeTag::Rx, &[1], &[2.0]),
                op(TypeTag::Rx, &[0], &[3.0]),
            ],
        );
        let sub = SubJob::new(
            "p",
            vec![
                inst(TypeTag::Rx, &[1], &[0.0]),
                inst(TypeTag::Rx, &[0], &[0.0]),
                inst(TypeTag::Rx, &[0], &[0.0]),
            ],
        );

        let mapping = build_mapping(0, &program, &sub).unwrap();
        assert_eq!(mapping.source_indices(), vec![1, 0, 2]);
    }

    #[test]
    fn parameterless_instructions_are_excluded() {
        let program = Program::from_operations(
            "p",
            vec![
                op(TypeTag::H, &[0], &[]),
                op(TypeTag::Ry, &[0], &[0.5]),
                op(TypeTag::Measure, &[0], &[]),
            ],
        );
        let sub = SubJob::new(
            "p",
            vec![
                inst(TypeTag::H, &[0], &[]),
                inst(TypeTag::Ry, &[0], &[0.0]),
                inst(TypeTag::Measure, &[0], &[]),
            ],
        );

        let mapping = build_mapping(0, &program, &sub).unwrap();
        assert_eq!(mapping.len(), program.parameterized_count());
        assert_eq!(
            mapping.iter().copied().collect::<Vec<_>>(),
            vec![MapEntry {
                instruction: 1,
                operation: 1
            }]
        );
    }

    #[test]
    fn missing_instruction_is_reported() {
        let program = Program::from_operations(
            "p",
            vec![op(TypeTag::Rz, &[0], &[0.1]), op(TypeTag::Rz, &[0], &[0.2])],
        );
        let sub = SubJob::new("p", vec![inst(TypeTag::Rz, &[0], &[0.0])]);

        let err = build_mapping(3, &program, &sub).unwrap_err();
        assert_eq!(
            err,
            CacheError::StructuralMismatch {
                slot: 3,
                reason: MismatchReason::MissingInstruction {
                    signature: "rz[0]".into(),
                    operation: 1,
                },
            }
        );
    }

    #[test]
    fn extra_instruction_is_reported() {
        let program = Program::from_operations("p", vec![op(TypeTag::X, &[0], &[])]);
        let sub = SubJob::new(
            "p",
            vec![inst(TypeTag::X, &[0], &[]), inst(TypeTag::Snapshot, &[0], &[])],
        );

        let err = build_mapping(0, &program, &sub).unwrap_err();
        assert!(matches!(
            err,
            CacheError::StructuralMismatch {
                reason: MismatchReason::ExtraInstruction { instruction: 1, .. },
                ..
            }
        ));
    }

    #[test]
    fn arity_disagreement_is_reported() {
        let program = Program::from_operations("p", vec![op(TypeTag::U3, &[0], &[0.1, 0.2, 0.3])]);
        let sub = SubJob::new("p", vec![inst(TypeTag::U3, &[0], &[0.0])]);

        let err = build_mapping(0, &program, &sub).unwrap_err();
        assert_eq!(
            err,
            CacheError::ParameterArityMismatch {
                slot: 0,
                instruction: 0,
                signature: "u3[0]".into(),
                compiled: 1,
                expected: 3,
            }
        );
    }

    #[test]
    fn composite_steps_are_matched_unrolled() {
        let program = Program::builder("c")
            .register("q", 2)
            .begin_composite("layer")
            .op(TypeTag::Ry, &[("q", 0)], [0.4])
            .op(TypeTag::Ry, &[("q", 1)], [0.6])
            .end_composite()
            .op(TypeTag::Cx, &[("q", 0), ("q", 1)], NO_PARAMS)
            .build()
            .unwrap();
        let sub = SubJob::new(
            "c",
            vec![
                inst(TypeTag::Ry, &[0], &[0.0]),
                inst(TypeTag::Ry, &[1], &[0.0]),
                inst(TypeTag::Cx, &[0, 1], &[]),
            ],
        );

        let mapping = build_mapping(0, &program, &sub).unwrap();
        assert_eq!(mapping.source_indices(), vec![0, 1]);
    }

    #[test]
    fn verify_rejects_duplicate_operations() {
        let sub = SubJob::new(
            "p",
            vec![inst(TypeTag::Rz, &[0], &[0.0]), inst(TypeTag::Rz, &[0], &[0.0])],
        );
        let mapping = Mapping {
            entries: vec![
                MapEntry {
                    instruction: 0,
                    operation: 0,
                },
                MapEntry {
                    instruction: 1,
                    operation: 0,
                },
            ],
        };
        assert!(matches!(
            mapping.verify(0, &sub),
            Err(CacheError::StructuralMismatch {
                reason: MismatchReason::DuplicateOperation { operation: 0 },
                ..
            })
        ));
    }

    #[test]
    fn verify_rejects_short_mapping() {
        let sub = SubJob::new("p", vec![inst(TypeTag::Rz, &[0], &[0.0])]);
        assert!(matches!(
            Mapping::default().verify(0, &sub),
            Err(CacheError::StructuralMismatch {
                reason: MismatchReason::MappingLength {
                    mapped: 0,
                    patchable: 1
                },
                ..
            })
        ));
    }
}
