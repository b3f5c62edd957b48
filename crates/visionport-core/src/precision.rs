use std::fmt;

/// What the caller would like. The device has the final say.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrecisionHint {
    #[default]
    PreferReduced,
    Full,
}

/// Numeric precision an engine was actually built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    F16,
    F32,
}

impl Precision {
    /// Half precision only when both the hint and the device probe allow it.
    pub fn resolve(hint: PrecisionHint, device_has_fast_fp16: bool) -> Self {
        match hint {
            PrecisionHint::PreferReduced if device_has_fast_fp16 => Precision::F16,
            _ => Precision::F32,
        }
    }

    pub fn is_reduced(self) -> bool {
        self == Precision::F16
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::F16 => f.write_str("fp16"),
            Precision::F32 => f.write_str("fp32"),
        }
    }
}
