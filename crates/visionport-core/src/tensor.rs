use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }
}

/// Ordered tensor dimensions, e.g. `[batch, channels, height, width]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }

    /// Product of all dimensions. Any zero dimension yields zero.
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Dimensions joined with `x`, the notation runtime profile options expect.
    pub fn to_dim_string(&self) -> String {
        self.0
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x")
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl FromStr for Shape {
    type Err = PipelineError;

    /// Parses `1x3x224x224`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let dims = raw
            .split(['x', 'X'])
            .map(|d| {
                d.trim().parse::<usize>().map_err(|_| {
                    PipelineError::Configuration(format!("invalid dimension `{d}` in shape `{raw}`"))
                })
            })
            .collect::<Result<SmallVec<[usize; 6]>, _>>()?;
        Ok(Self(dims))
    }
}
