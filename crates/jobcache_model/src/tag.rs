use std::fmt;
use std::str::FromStr;

use jobcache_utils::find_best_match;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Closed set of operation kinds shared by source programs and compiled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Id,
    X,
    Y,
    Z,
    H,
    S,
    Sdg,
    T,
    Tdg,
    Rx,
    Ry,
    Rz,
    U1,
    U2,
    U3,
    Cx,
    Cy,
    Cz,
    Ch,
    Crz,
    Cu1,
    Cu3,
    Swap,
    Rzz,
    Ccx,
    Cswap,
    Measure,
    Reset,
    Barrier,
    Snapshot,
}

impl TypeTag {
    pub const ALL: [TypeTag; 30] = [
        TypeTag::Id,
        TypeTag::X,
        TypeTag::Y,
        TypeTag::Z,
        TypeTag::H,
        TypeTag::S,
        TypeTag::Sdg,
        TypeTag::T,
        TypeTag::Tdg,
        TypeTag::Rx,
        TypeTag::Ry,
        TypeTag::Rz,
        TypeTag::U1,
        TypeTag::U2,
        TypeTag::U3,
        TypeTag::Cx,
        TypeTag::Cy,
        TypeTag::Cz,
        TypeTag::Ch,
        TypeTag::Crz,
        TypeTag::Cu1,
        TypeTag::Cu3,
        TypeTag::Swap,
        TypeTag::Rzz,
        TypeTag::Ccx,
        TypeTag::Cswap,
        TypeTag::Measure,
        TypeTag::Reset,
        TypeTag::Barrier,
        TypeTag::Snapshot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Id => "id",
            TypeTag::X => "x",
            TypeTag::Y => "y",
            TypeTag::Z => "z",
            TypeTag::H => "h",
            TypeTag::S => "s",
            TypeTag::Sdg => "sdg",
            TypeTag::T => "t",
            TypeTag::Tdg => "tdg",
            TypeTag::Rx => "rx",
            TypeTag::Ry => "ry",
            TypeTag::Rz => "rz",
            TypeTag::U1 => "u1",
            TypeTag::U2 => "u2",
            TypeTag::U3 => "u3",
            TypeTag::Cx => "cx",
            TypeTag::Cy => "cy",
            TypeTag::Cz => "cz",
            TypeTag::Ch => "ch",
            TypeTag::Crz => "crz",
            TypeTag::Cu1 => "cu1",
            TypeTag::Cu3 => "cu3",
            TypeTag::Swap => "swap",
            TypeTag::Rzz => "rzz",
            TypeTag::Ccx => "ccx",
            TypeTag::Cswap => "cswap",
            TypeTag::Measure => "measure",
            TypeTag::Reset => "reset",
            TypeTag::Barrier => "barrier",
            TypeTag::Snapshot => "snapshot",
        }
    }

    /// Read-out and bookkeeping steps. They never carry parameters.
    pub fn is_marker(self) -> bool {
        matches!(
            self,
            TypeTag::Measure | TypeTag::Reset | TypeTag::Barrier | TypeTag::Snapshot
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TypeTag {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::UnknownTag {
                name: s.to_string(),
                suggestion: find_best_match(s, TypeTag::ALL.iter().map(|tag| tag.name()))
                    .map(str::to_string),
            })
    }
}
