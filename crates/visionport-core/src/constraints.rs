use tracing::Level;

use crate::{PipelineError, PrecisionHint, Result, Shape};

/// Default scratch budget for kernel/tactic selection: 1 GiB.
pub const DEFAULT_WORKSPACE_BYTES: usize = 1 << 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizationProfile {
    pub min: Shape,
    pub opt: Shape,
    pub max: Shape,
}

impl OptimizationProfile {
    pub fn fixed(shape: Shape) -> Self {
        Self {
            min: shape.clone(),
            opt: shape.clone(),
            max: shape,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.opt && self.opt == self.max
    }
}

/// Everything a compiler needs besides the graph itself.
#[derive(Clone, Debug)]
pub struct BuildConstraints {
    pub input_name: String,
    pub profile: OptimizationProfile,
    pub precision_hint: PrecisionHint,
    pub workspace_bytes: usize,
    pub max_batch: usize,
    /// Runtime diagnostics below this severity are dropped.
    pub runtime_log_level: Level,
}

impl BuildConstraints {
    pub fn fixed(input_name: impl Into<String>, shape: Shape) -> Self {
        Self {
            input_name: input_name.into(),
            profile: OptimizationProfile::fixed(shape),
            precision_hint: PrecisionHint::default(),
            workspace_bytes: DEFAULT_WORKSPACE_BYTES,
            max_batch: 1,
            runtime_log_level: Level::ERROR,
        }
    }

    pub fn with_precision_hint(mut self, hint: PrecisionHint) -> Self {
        self.precision_hint = hint;
        self
    }

    pub fn with_workspace_bytes(mut self, bytes: usize) -> Self {
        self.workspace_bytes = bytes;
        self
    }

    pub fn with_runtime_log_level(mut self, level: Level) -> Self {
        self.runtime_log_level = level;
        self
    }

    /// The single shape every profile selector agrees on.
    pub fn input_shape(&self) -> &Shape {
        &self.profile.opt
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_name.is_empty() {
            return Err(PipelineError::Configuration(
                "input binding name is empty".to_string(),
            ));
        }
        if !self.profile.is_fixed() {
            return Err(PipelineError::Configuration(format!(
                "dynamic shapes are not supported: min {} opt {} max {}",
                self.profile.min, self.profile.opt, self.profile.max
            )));
        }
        let shape = self.input_shape();
        if shape.element_count() == 0 {
            return Err(PipelineError::Configuration(format!(
                "input shape {shape} has no elements"
            )));
        }
        if self.max_batch != 1 {
            return Err(PipelineError::Configuration(format!(
                "max batch {} unsupported; only batch 1 is dispatched",
                self.max_batch
            )));
        }
        if shape.dim(0).is_some_and(|batch| batch > self.max_batch) {
            return Err(PipelineError::Configuration(format!(
                "profile batch {} exceeds max batch {}",
                shape.0[0], self.max_batch
            )));
        }
        if self.workspace_bytes == 0 {
            return Err(PipelineError::Configuration(
                "workspace budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
