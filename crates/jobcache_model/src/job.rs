use serde::{Deserialize, Serialize};

use crate::signature::Structural;
use crate::tag::TypeTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledInstruction {
    pub tag: TypeTag,
    pub operands: Vec<usize>,
    /// Non-finite placeholders are written as `"NaN"`, `"inf"` or `"-inf"`
    /// because JSON numbers cannot hold them.
    #[serde(default, with = "params_repr")]
    pub params: Vec<f64>,
}

impl CompiledInstruction {
    pub fn new(tag: TypeTag, operands: Vec<usize>, params: Vec<f64>) -> Self {
        Self {
            tag,
            operands,
            params,
        }
    }

    /// Instructions without parameters are never rewritten by a patch.
    pub fn is_patchable(&self) -> bool {
        !self.params.is_empty()
    }
}

impl Structural for CompiledInstruction {
    fn tag(&self) -> TypeTag {
        self.tag
    }

    fn operands(&self) -> &[usize] {
        &self.operands
    }

    fn parameter_count(&self) -> usize {
        self.params.len()
    }
}

mod params_repr {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Param {
        Number(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(params: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(params.iter().map(|&value| {
            if value.is_finite() {
                Param::Number(value)
            } else {
                Param::Special(value.to_string())
            }
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Param>::deserialize(deserializer)?
            .into_iter()
            .map(|param| match param {
                Param::Number(value) => Ok(value),
                Param::Special(text) => text
                    .parse::<f64>()
                    .ok()
                    .filter(|value| !value.is_finite())
                    .ok_or_else(|| D::Error::custom(format!("invalid parameter value `{text}`"))),
            })
            .collect()
    }
}

/// The compiled form of one source program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubJob {
    pub name: String,
    pub instructions: Vec<CompiledInstruction>,
    /// Compiler-emitted assembly text. Only meaningful for the exact
    /// parameters it was compiled with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<String>,
}

impl SubJob {
    pub fn new(name: impl Into<String>, instructions: Vec<CompiledInstruction>) -> Self {
        Self {
            name: name.into(),
            instructions,
            listing: None,
        }
    }

    pub fn with_listing(mut self, listing: impl Into<String>) -> Self {
        self.listing = Some(listing.into());
        self
    }

    pub fn patchable_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|inst| inst.is_patchable())
            .count()
    }
}

/// A compiled submission: one sub-job per program in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledJob {
    pub backend: String,
    pub sub_jobs: Vec<SubJob>,
}

impl CompiledJob {
    pub fn new(backend: impl Into<String>, sub_jobs: Vec<SubJob>) -> Self {
        Self {
            backend: backend.into(),
            sub_jobs,
        }
    }

    pub fn len(&self) -> usize {
        self.sub_jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_jobs.is_empty()
    }
}
