use std::fmt;

use crate::tag::TypeTag;

/// Structural identity of an operation or instruction: its type and the flat
/// operand addresses it touches. Parameters are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub tag: TypeTag,
    pub operands: Vec<usize>,
}

impl Signature {
    pub fn new(tag: TypeTag, operands: Vec<usize>) -> Self {
        Self { tag, operands }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.tag, self.operands)
    }
}

/// Anything that has a structural signature and a parameter list.
pub trait Structural {
    fn tag(&self) -> TypeTag;

    fn operands(&self) -> &[usize];

    fn parameter_count(&self) -> usize;

    fn signature(&self) -> Signature {
        Signature::new(self.tag(), self.operands().to_vec())
    }

    fn same_shape<O: Structural + ?Sized>(&self, other: &O) -> bool {
        self.tag() == other.tag() && self.operands() == other.operands()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_operands() {
        let sig = Signature::new(TypeTag::Cx, vec![0, 1]);
        assert_eq!(sig.to_string(), "cx[0, 1]");
    }
}
