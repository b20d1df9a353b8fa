use std::fmt;
use std::sync::Arc;

use jobcache_model::{Program, Structural};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// SHA-1 fingerprint of a program's unrolled structure: type tags, flat
/// operands and parameter counts, never parameter values. Two programs that
/// differ only in their parameters share a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuralKey(Arc<str>);

impl StructuralKey {
    pub fn of(program: &Program) -> Self {
        let mut hasher = Sha1::new();
        for op in program.unrolled() {
            hasher.update(op.tag().name().as_bytes());
            hasher.update((op.operands().len() as u64).to_le_bytes());
            for operand in op.operands() {
                hasher.update((*operand as u64).to_le_bytes());
            }
            hasher.update((op.parameter_count() as u64).to_le_bytes());
            hasher.update(b";");
        }
        Self(Arc::from(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructuralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use jobcache_model::{Operation, TypeTag};

    use super::*;

    fn ansatz(theta: f64) -> Program {
        Program::from_operations(
            "ansatz",
            vec![
                Operation::new(TypeTag::Ry, vec![0], [theta]),
                Operation::new(TypeTag::Cx, vec![0, 1], jobcache_model::NO_PARAMS),
            ],
        )
    }

    #[test]
    fn key_ignores_parameter_values() {
        assert_eq!(StructuralKey::of(&ansatz(0.1)), StructuralKey::of(&ansatz(2.5)));
    }

    #[test]
    fn key_changes_with_operands() {
        let swapped = Program::from_operations(
            "ansatz",
            vec![
                Operation::new(TypeTag::Ry, vec![1], [0.1]),
                Operation::new(TypeTag::Cx, vec![0, 1], jobcache_model::NO_PARAMS),
            ],
        );
        assert_ne!(StructuralKey::of(&ansatz(0.1)), StructuralKey::of(&swapped));
    }

    #[test]
    fn key_is_hex_sha1() {
        let key = StructuralKey::of(&ansatz(0.0));
        assert_eq!(key.as_str().len(), 40);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
