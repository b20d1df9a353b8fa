use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown operation type `{name}`{}", hint(.suggestion))]
    UnknownTag {
        name: String,
        suggestion: Option<String>,
    },
    #[error("register `{name}` is not declared{}", hint(.suggestion))]
    UnknownRegister {
        name: String,
        suggestion: Option<String>,
    },
    #[error("register `{name}` is declared twice")]
    DuplicateRegister { name: String },
    #[error("index {index} is out of range for register `{register}` of size {size}")]
    OperandOutOfRange {
        register: String,
        index: usize,
        size: usize,
    },
}

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean `{s}`?)"))
        .unwrap_or_default()
}
