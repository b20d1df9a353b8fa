use jobcache_utils::find_best_match;

use crate::error::ModelError;
use crate::signature::Structural;
use crate::tag::TypeTag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub size: usize,
}

/// A numeric parameter as the caller supplied it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
}

impl ParamValue {
    /// Conversion into the fixed-width representation compiled jobs carry.
    pub fn to_f64(self) -> f64 {
        match self {
            ParamValue::Float(value) => value,
            ParamValue::Int(value) => value as f64,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(f64::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub tag: TypeTag,
    pub operands: Vec<usize>,
    pub params: Vec<ParamValue>,
}

impl Operation {
    pub fn new<P>(tag: TypeTag, operands: Vec<usize>, params: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<ParamValue>,
    {
        Self {
            tag,
            operands,
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_parameterized(&self) -> bool {
        !self.params.is_empty()
    }
}

impl Structural for Operation {
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

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Op(Operation),
    /// A named group of steps that the compiler sees flattened.
    Composite { name: String, steps: Vec<Step> },
}

impl Step {
    fn unroll_into<'a>(&'a self, out: &mut Vec<&'a Operation>) {
        match self {
            Step::Op(op) => out.push(op),
            Step::Composite { steps, .. } => {
                for step in steps {
                    step.unroll_into(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    name: String,
    registers: Vec<Register>,
    steps: Vec<Step>,
}

impl Program {
    /// A program over already-flattened operand addresses.
    pub fn from_operations(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            name: name.into(),
            registers: Vec::new(),
            steps: operations.into_iter().map(Step::Op).collect(),
        }
    }

    pub fn builder(name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Operations in compiler order, composites expanded recursively. Mapping
    /// indices always refer to positions in this list.
    pub fn unrolled(&self) -> Vec<&Operation> {
        let mut out = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            step.unroll_into(&mut out);
        }
        out
    }

    pub fn parameterized_count(&self) -> usize {
        self.unrolled()
            .into_iter()
            .filter(|op| op.is_parameterized())
            .count()
    }
}

/// Incremental program construction with register-relative operands.
///
/// Operands are given as `(register, index)` pairs and resolved to flat
/// addresses by offsetting with the sizes of the quantum registers declared
/// before the named one. Classical registers are validated but never appear in
/// the resolved operand list. The first error is kept and reported by
/// [`ProgramBuilder::build`].
#[derive(Debug)]
pub struct ProgramBuilder {
    name: String,
    registers: Vec<Register>,
    classical: Vec<Register>,
    frames: Vec<(String, Vec<Step>)>,
    steps: Vec<Step>,
    error: Option<ModelError>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registers: Vec::new(),
            classical: Vec::new(),
            frames: Vec::new(),
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn register(mut self, name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        if self.is_declared(&name) {
            self.fail(ModelError::DuplicateRegister { name });
        } else {
            self.registers.push(Register { name, size });
        }
        self
    }

    pub fn classical(mut self, name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        if self.is_declared(&name) {
            self.fail(ModelError::DuplicateRegister { name });
        } else {
            self.classical.push(Register { name, size });
        }
        self
    }

    pub fn op<P>(mut self, tag: TypeTag, operands: &[(&str, usize)], params: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<ParamValue>,
    {
        let mut flat = Vec::with_capacity(operands.len());
        for &(register, index) in operands {
            match self.resolve(register, index) {
                Ok(Some(address)) => flat.push(address),
                Ok(None) => {}
                Err(err) => {
                    self.fail(err);
                    return self;
                }
            }
        }
        let op = Operation::new(tag, flat, params);
        self.steps.push(Step::Op(op));
        self
    }

    /// Opens a composite; every following step lands inside it until
    /// [`ProgramBuilder::end_composite`].
    pub fn begin_composite(mut self, name: impl Into<String>) -> Self {
        let outer = std::mem::take(&mut self.steps);
        self.frames.push((name.into(), outer));
        self
    }

    pub fn end_composite(mut self) -> Self {
        if let Some((name, outer)) = self.frames.pop() {
            let inner = std::mem::replace(&mut self.steps, outer);
            self.steps.push(Step::Composite { name, steps: inner });
        }
        self
    }

    pub fn build(mut self) -> Result<Program, ModelError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        while !self.frames.is_empty() {
            self = self.end_composite();
        }
        Ok(Program {
            name: self.name,
            registers: self.registers,
            steps: self.steps,
        })
    }

    fn is_declared(&self, name: &str) -> bool {
        self.registers
            .iter()
            .chain(&self.classical)
            .any(|reg| reg.name == name)
    }

    fn resolve(&self, register: &str, index: usize) -> Result<Option<usize>, ModelError> {
        let mut offset = 0;
        for reg in &self.registers {
            if reg.name == register {
                return check_index(reg, index).map(|()| Some(offset + index));
            }
            offset += reg.size;
        }
        if let Some(reg) = self.classical.iter().find(|reg| reg.name == register) {
            return check_index(reg, index).map(|()| None);
        }
        Err(ModelError::UnknownRegister {
            name: register.to_string(),
            suggestion: find_best_match(
                register,
                self.registers
                    .iter()
                    .chain(&self.classical)
                    .map(|reg| reg.name.as_str()),
            )
            .map(str::to_string),
        })
    }

    fn fail(&mut self, err: ModelError) {
        self.error.get_or_insert(err);
    }
}

fn check_index(reg: &Register, index: usize) -> Result<(), ModelError> {
    if index < reg.size {
        Ok(())
    } else {
        Err(ModelError::OperandOutOfRange {
            register: reg.name.clone(),
            index,
            size: reg.size,
        })
    }
}

/// Empty parameter list for parameterless steps.
pub const NO_PARAMS: [f64; 0] = [];
