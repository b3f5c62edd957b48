use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};
use visionport_core::{
    BindingDirection, BindingSet, BuildConstraints, CompiledEngine, DeviceAllocator,
    EngineCompiler, ExecutionContext, LabelTable, ModelArtifact, PipelineError, Precision, Result,
};

use crate::{FramePreprocessor, PredictionEntry, ResultDecoder};

/// Where a run currently is. Stages only move forward within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Uninitialized,
    Compiled,
    BuffersAllocated,
    InputReady,
    Executed,
    Decoded,
    Released,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub model: ModelArtifact,
    pub image_path: PathBuf,
    pub labels_path: PathBuf,
    pub constraints: BuildConstraints,
    pub batch_size: usize,
}

impl PipelineConfig {
    pub fn new(
        model: ModelArtifact,
        image_path: impl Into<PathBuf>,
        labels_path: impl Into<PathBuf>,
        constraints: BuildConstraints,
    ) -> Self {
        Self {
            model,
            image_path: image_path.into(),
            labels_path: labels_path.into(),
            constraints,
            batch_size: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub predictions: Vec<PredictionEntry>,
    pub probabilities_sum: f32,
    pub inference_latency: Duration,
    pub precision: Precision,
    pub input_elements_written: usize,
}

/// Compile, bind, preprocess, execute, decode, release.
pub struct InferencePipeline<C: EngineCompiler> {
    compiler: C,
    allocator: DeviceAllocator,
    config: PipelineConfig,
    decoder: ResultDecoder,
    stage: PipelineStage,
}

impl<C: EngineCompiler> InferencePipeline<C> {
    pub fn new(compiler: C, allocator: DeviceAllocator, config: PipelineConfig) -> Self {
        Self {
            compiler,
            allocator,
            config,
            decoder: ResultDecoder::new(),
            stage: PipelineStage::Uninitialized,
        }
    }

    pub fn with_decoder(mut self, decoder: ResultDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn allocator(&self) -> &DeviceAllocator {
        &self.allocator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn compile(&mut self) -> Result<C::Engine> {
        self.stage = PipelineStage::Uninitialized;
        let engine = self
            .compiler
            .compile(&self.config.model, &self.config.constraints, &self.allocator)
            .inspect_err(|err| {
                error!(compiler = self.compiler.name(), error = %err, "engine build failed");
            })?;
        self.advance(PipelineStage::Compiled);
        Ok(engine)
    }

    /// Single-shot: compile, then run once.
    pub fn run(&mut self) -> Result<PipelineReport> {
        let engine = self.compile()?;
        self.run_with_engine(&engine)
    }

    /// One inference against an already compiled engine. Every device buffer
    /// allocated here is released before returning, on success or failure.
    pub fn run_with_engine<E: CompiledEngine>(&mut self, engine: &E) -> Result<PipelineReport> {
        self.stage = PipelineStage::Compiled;
        let outcome = self.run_stages(engine);
        if let Err(err) = &outcome {
            error!(stage = ?self.stage, error = %err, "pipeline aborted");
        }
        self.advance(PipelineStage::Released);
        info!(
            live_buffers = self.allocator.live_buffers(),
            "device buffers released"
        );
        outcome
    }

    fn run_stages<E: CompiledEngine>(&mut self, engine: &E) -> Result<PipelineReport> {
        let batch = self.config.batch_size;
        if batch == 0 || batch > engine.max_batch() {
            return Err(PipelineError::Configuration(format!(
                "batch size {batch} unsupported by engine (max {})",
                engine.max_batch()
            )));
        }

        let input_name = &self.config.constraints.input_name;
        let input_spec = engine
            .bindings()
            .iter()
            .find(|b| b.is_input() && b.name.as_str() == input_name.as_str())
            .or_else(|| engine.first_binding(BindingDirection::Input))
            .ok_or_else(|| {
                PipelineError::Configuration("engine exposes no input binding".to_string())
            })?;
        let frame = FramePreprocessor::prepare(&self.config.image_path, &input_spec.shape)?;

        let mut buffers = BindingSet::allocate(&self.allocator, engine.bindings(), batch)?;
        self.advance(PipelineStage::BuffersAllocated);
        buffers.ensure_runnable()?;

        let input = buffers
            .get_mut(input_spec.index)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "no device buffer for input binding {}",
                    input_spec.index
                ))
            })?;
        FramePreprocessor::upload(&frame, input)?;
        let input_elements_written = input.elements_written();
        self.advance(PipelineStage::InputReady);

        let started = Instant::now();
        {
            let mut context = engine.create_context()?;
            context.enqueue(&mut buffers)?;
            context.synchronize()?;
        }
        let inference_latency = started.elapsed();
        self.advance(PipelineStage::Executed);
        info!(
            latency_ms = inference_latency.as_millis() as u64,
            "inference complete"
        );

        let output = buffers.first_output().ok_or_else(|| {
            PipelineError::Configuration("engine exposes no output binding".to_string())
        })?;
        let labels = LabelTable::load_or_empty(&self.config.labels_path);
        let decoded = self
            .decoder
            .decode(output, output.shape(), batch, &labels)?;
        self.advance(PipelineStage::Decoded);

        Ok(PipelineReport {
            probabilities_sum: decoded.probabilities.iter().sum(),
            predictions: decoded.predictions,
            inference_latency,
            precision: engine.precision(),
            input_elements_written,
        })
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(next >= self.stage, "{:?} -> {next:?}", self.stage);
        self.stage = next;
        info!(stage = ?next, "pipeline stage");
    }
}
