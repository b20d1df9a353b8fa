//! Source programs and compiled jobs as seen by the structural cache.
//!
//! Programs are built once by the caller and never mutated; compiled jobs come
//! from an external compiler and only ever have their parameter lists
//! rewritten.

pub mod error;
pub mod job;
pub mod program;
pub mod signature;
pub mod tag;

pub use error::ModelError;
pub use job::{CompiledInstruction, CompiledJob, SubJob};
pub use program::{NO_PARAMS, Operation, ParamValue, Program, ProgramBuilder, Register, Step};
pub use signature::{Signature, Structural};
pub use tag::TypeTag;
