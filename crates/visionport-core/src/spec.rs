use crate::{DType, Shape};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl IOName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingDirection {
    Input,
    Output,
}

/// Per-binding metadata exposed by a compiled engine. Shapes are fully
/// resolved; no dynamic dimensions survive compilation.
#[derive(Clone, Debug)]
pub struct BindingSpec {
    pub index: usize,
    pub name: IOName,
    pub direction: BindingDirection,
    pub dtype: DType,
    pub shape: Shape,
}

impl BindingSpec {
    pub fn is_input(&self) -> bool {
        self.direction == BindingDirection::Input
    }
}
