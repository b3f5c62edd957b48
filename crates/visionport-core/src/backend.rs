use crate::{
    BindingDirection, BindingSet, BindingSpec, BuildConstraints, DeviceAllocator, ModelArtifact,
    Precision, Result,
};

/// Turns a serialized graph into an engine for one device.
///
/// Compilation is expensive; compile once and reuse the engine.
pub trait EngineCompiler {
    type Engine: CompiledEngine;

    fn name(&self) -> &'static str;

    fn compile(
        &self,
        artifact: &ModelArtifact,
        constraints: &BuildConstraints,
        allocator: &DeviceAllocator,
    ) -> Result<Self::Engine>;
}

/// Immutable result of compilation.
pub trait CompiledEngine {
    /// Contexts borrow the engine, so an engine always outlives them.
    type Context<'e>: ExecutionContext
    where
        Self: 'e;

    fn bindings(&self) -> &[BindingSpec];

    /// Precision chosen at build time. Never re-probed.
    fn precision(&self) -> Precision;

    fn max_batch(&self) -> usize;

    /// One live context per engine; a second concurrent request fails.
    fn create_context(&self) -> Result<Self::Context<'_>>;

    fn first_binding(&self, direction: BindingDirection) -> Option<&BindingSpec> {
        self.bindings().iter().find(|b| b.direction == direction)
    }
}

pub trait ExecutionContext {
    /// Queue one execution over `bindings`. Results are only guaranteed
    /// visible after `synchronize`.
    fn enqueue(&mut self, bindings: &mut BindingSet) -> Result<()>;

    fn synchronize(&mut self) -> Result<()>;
}
