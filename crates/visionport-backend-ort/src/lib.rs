use std::sync::{Mutex, MutexGuard, TryLockError};

use ort::{
    logging::LogLevel,
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::ValueType,
};
use tracing::{debug, info, Level};
use visionport_core::{
    BindingDirection, BindingSet, BindingSpec, BuildConstraints, CompiledEngine, DType, Device,
    DeviceAllocator, EngineCompiler, ExecutionContext, IOName, ModelArtifact, PipelineError,
    Precision, PrecisionHint, Result, Shape,
};

/// Builds ONNX Runtime sessions and presents them as fixed-shape engines.
pub struct OrtCompiler;

impl OrtCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtCompiler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtEngine {
    session: Mutex<Session>,
    bindings: Vec<BindingSpec>,
    precision: Precision,
    max_batch: usize,
}

impl EngineCompiler for OrtCompiler {
    type Engine = OrtEngine;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn compile(
        &self,
        artifact: &ModelArtifact,
        constraints: &BuildConstraints,
        allocator: &DeviceAllocator,
    ) -> Result<Self::Engine> {
        constraints.validate()?;

        let precision = resolve_precision(
            constraints.precision_hint,
            allocator.device(),
            allocator.supports_fast_fp16(),
        );
        info!(
            model = %artifact.describe(),
            device = %allocator.device(),
            %precision,
            workspace_bytes = constraints.workspace_bytes,
            "building engine"
        );

        let builder = Session::builder()
            .map_err(compilation("failed to create ORT session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(compilation("failed to configure ORT session builder"))?
            .with_log_level(ort_log_level(constraints.runtime_log_level))
            .map_err(compilation("failed to set ORT log level"))?;

        let builder =
            configure_session_builder(builder, allocator.device(), constraints, precision)?;

        let session = match artifact {
            ModelArtifact::OnnxPath(path) => builder.commit_from_file(path),
            ModelArtifact::OnnxBytes(bytes) => builder.commit_from_memory(bytes),
        }
        .map_err(|e| {
            PipelineError::Parse(format!("could not parse {}: {e}", artifact.describe()))
        })?;

        let bindings = build_bindings(&session, constraints)?;

        let footprint: usize = bindings
            .iter()
            .map(|b| b.shape.element_count() * b.dtype.byte_size())
            .sum();
        if footprint > constraints.workspace_bytes {
            return Err(PipelineError::Compilation(format!(
                "binding footprint of {footprint} bytes exceeds workspace budget of {} bytes",
                constraints.workspace_bytes
            )));
        }

        for binding in &bindings {
            debug!(
                index = binding.index,
                name = binding.name.as_str(),
                direction = ?binding.direction,
                shape = %binding.shape,
                "engine binding"
            );
        }

        Ok(OrtEngine {
            session: Mutex::new(session),
            bindings,
            precision,
            max_batch: constraints.max_batch,
        })
    }
}

impl CompiledEngine for OrtEngine {
    type Context<'e> = OrtContext<'e> where Self: 'e;

    fn bindings(&self) -> &[BindingSpec] {
        &self.bindings
    }

    fn precision(&self) -> Precision {
        self.precision
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    fn create_context(&self) -> Result<Self::Context<'_>> {
        let session = self.session.try_lock().map_err(|e| match e {
            TryLockError::WouldBlock => {
                PipelineError::Configuration("execution context busy".to_string())
            }
            TryLockError::Poisoned(_) => {
                PipelineError::Execution("session lock poisoned".to_string())
            }
        })?;

        Ok(OrtContext {
            session,
            bindings: &self.bindings,
            in_flight: false,
        })
    }
}

/// Holds the session exclusively for as long as it lives.
pub struct OrtContext<'e> {
    session: MutexGuard<'e, Session>,
    bindings: &'e [BindingSpec],
    in_flight: bool,
}

impl ExecutionContext for OrtContext<'_> {
    fn enqueue(&mut self, buffers: &mut BindingSet) -> Result<()> {
        if self.in_flight {
            return Err(PipelineError::Execution(
                "previous execution has not been synchronized".to_string(),
            ));
        }

        let mut ort_inputs = Vec::new();
        for spec in self.bindings.iter().filter(|b| b.is_input()) {
            let buffer = buffers.get(spec.index).ok_or_else(|| missing_buffer(spec))?;
            let shape: Vec<usize> = spec.shape.dims().to_vec();
            let value = ort::value::Tensor::from_array((shape, buffer.read()?))
                .map_err(execution)?
                .into_dyn();
            ort_inputs.push((spec.name.0.clone(), SessionInputValue::from(value)));
        }

        let outputs = self.session.run(ort_inputs).map_err(execution)?;

        for spec in self.bindings.iter().filter(|b| !b.is_input()) {
            let value = outputs.get(spec.name.as_str()).ok_or_else(|| {
                PipelineError::Execution(format!("runtime produced no `{}`", spec.name.as_str()))
            })?;
            let (_, data) = value.try_extract_tensor::<f32>().map_err(execution)?;

            let buffer = buffers
                .get_mut(spec.index)
                .ok_or_else(|| missing_buffer(spec))?;
            if data.len() != buffer.len() {
                return Err(PipelineError::Execution(format!(
                    "output `{}` has {} elements, binding expects {}",
                    spec.name.as_str(),
                    data.len(),
                    buffer.len()
                )));
            }
            buffer.write(0, data)?;
        }

        self.in_flight = true;
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        // `Session::run` returns with outputs materialised; nothing left to wait on.
        self.in_flight = false;
        Ok(())
    }
}

/// Whether the execution provider chosen for `device` can build an fp16
/// plan. Only TensorRT does; the CUDA and CPU providers run the graph as
/// stored.
pub fn reduced_precision_available(device: &Device) -> bool {
    matches!(device, Device::Cuda { .. }) && cfg!(feature = "tensorrt")
}

/// The precision the engine will actually run at on `device`.
pub fn resolve_precision(
    hint: PrecisionHint,
    device: &Device,
    device_has_fast_fp16: bool,
) -> Precision {
    Precision::resolve(hint, reduced_precision_available(device) && device_has_fast_fp16)
}

fn build_bindings(session: &Session, constraints: &BuildConstraints) -> Result<Vec<BindingSpec>> {
    let mut bindings = Vec::with_capacity(session.inputs.len() + session.outputs.len());
    let mut found_named_input = false;

    for input in &session.inputs {
        let dims = f32_tensor_dims(&input.name, &input.input_type)?;
        let shape = if input.name == constraints.input_name {
            found_named_input = true;
            reconcile_with_profile(&input.name, &dims, constraints.input_shape())?
        } else {
            resolve_static(&input.name, &dims, constraints.max_batch)?
        };
        bindings.push(BindingSpec {
            index: bindings.len(),
            name: IOName(input.name.clone()),
            direction: BindingDirection::Input,
            dtype: DType::F32,
            shape,
        });
    }

    if !found_named_input {
        let available = session
            .inputs
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(PipelineError::Configuration(format!(
            "model has no input named `{}` (inputs: {available})",
            constraints.input_name
        )));
    }

    for output in &session.outputs {
        let dims = f32_tensor_dims(&output.name, &output.output_type)?;
        bindings.push(BindingSpec {
            index: bindings.len(),
            name: IOName(output.name.clone()),
            direction: BindingDirection::Output,
            dtype: DType::F32,
            shape: resolve_static(&output.name, &dims, constraints.max_batch)?,
        });
    }

    Ok(bindings)
}

/// Model dims with `-1` for dynamic axes.
fn f32_tensor_dims(name: &str, value_type: &ValueType) -> Result<Vec<i64>> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        return Err(PipelineError::Configuration(format!(
            "binding `{name}` is not a tensor"
        )));
    };
    let dtype = to_dtype(*ty).ok_or_else(|| {
        PipelineError::Configuration(format!(
            "binding `{name}` has unsupported element type {ty:?}"
        ))
    })?;
    if dtype != DType::F32 {
        return Err(PipelineError::Configuration(format!(
            "binding `{name}` has element type {dtype:?}; only f32 is supported"
        )));
    }
    Ok(shape.iter().copied().collect())
}

pub fn to_dtype(ty: TensorElementType) -> Option<DType> {
    match ty {
        TensorElementType::Float32 => Some(DType::F32),
        TensorElementType::Float16 => Some(DType::F16),
        TensorElementType::Int64 => Some(DType::I64),
        TensorElementType::Int32 => Some(DType::I32),
        TensorElementType::Uint8 => Some(DType::U8),
        _ => None,
    }
}

fn reconcile_with_profile(name: &str, dims: &[i64], profile: &Shape) -> Result<Shape> {
    if dims.len() != profile.rank() {
        return Err(PipelineError::Configuration(format!(
            "input `{name}` has rank {}, profile shape {profile} has rank {}",
            dims.len(),
            profile.rank()
        )));
    }
    for (axis, (&model_dim, &wanted)) in dims.iter().zip(profile.dims()).enumerate() {
        if model_dim >= 0 && model_dim as usize != wanted {
            return Err(PipelineError::Configuration(format!(
                "input `{name}` axis {axis} is fixed at {model_dim}, profile asks for {wanted}"
            )));
        }
    }
    Ok(profile.clone())
}

fn resolve_static(name: &str, dims: &[i64], max_batch: usize) -> Result<Shape> {
    let resolved = dims
        .iter()
        .enumerate()
        .map(|(axis, &d)| match (axis, d) {
            (_, d) if d >= 0 => Ok(d as usize),
            (0, _) => Ok(max_batch),
            (axis, _) => Err(PipelineError::Configuration(format!(
                "binding `{name}` has dynamic axis {axis}; only the batch axis may be dynamic"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Shape::from_slice(&resolved))
}

fn ort_log_level(level: Level) -> LogLevel {
    if level == Level::ERROR {
        LogLevel::Error
    } else if level == Level::WARN {
        LogLevel::Warning
    } else if level == Level::INFO {
        LogLevel::Info
    } else {
        LogLevel::Verbose
    }
}

fn configure_session_builder(
    builder: SessionBuilder,
    device: &Device,
    constraints: &BuildConstraints,
    precision: Precision,
) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id, constraints, precision),
    }
}

#[cfg(feature = "tensorrt")]
fn configure_cuda(
    builder: SessionBuilder,
    device_id: u32,
    constraints: &BuildConstraints,
    precision: Precision,
) -> Result<SessionBuilder> {
    use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};

    let profile = &constraints.profile;
    let profile_shape =
        |shape: &Shape| format!("{}:{}", constraints.input_name, shape.to_dim_string());
    let trt = TensorRTExecutionProvider::default()
        .with_device_id(device_id as i32)
        .with_fp16(precision.is_reduced())
        .with_max_workspace_size(constraints.workspace_bytes)
        .with_profile_min_shapes(profile_shape(&profile.min))
        .with_profile_opt_shapes(profile_shape(&profile.opt))
        .with_profile_max_shapes(profile_shape(&profile.max))
        .build()
        .error_on_failure();
    let cuda = CUDAExecutionProvider::default()
        .with_device_id(device_id as i32)
        .build()
        .error_on_failure();
    builder
        .with_execution_providers([trt, cuda])
        .map_err(compilation("failed to enable ORT TensorRT execution provider"))
}

#[cfg(all(feature = "cuda", not(feature = "tensorrt")))]
fn configure_cuda(
    builder: SessionBuilder,
    device_id: u32,
    _constraints: &BuildConstraints,
    _precision: Precision,
) -> Result<SessionBuilder> {
    use ort::execution_providers::CUDAExecutionProvider;

    let ep = CUDAExecutionProvider::default()
        .with_device_id(device_id as i32)
        .build()
        .error_on_failure();
    builder
        .with_execution_providers([ep])
        .map_err(compilation("failed to enable ORT CUDA execution provider"))
}

#[cfg(not(feature = "cuda"))]
fn configure_cuda(
    builder: SessionBuilder,
    device_id: u32,
    _constraints: &BuildConstraints,
    _precision: Precision,
) -> Result<SessionBuilder> {
    let _ = (builder, device_id);
    Err(PipelineError::Compilation(
        "CUDA requested but visionport-backend-ort was built without the `cuda` feature"
            .to_string(),
    ))
}

fn compilation(context: &'static str) -> impl Fn(ort::Error) -> PipelineError {
    move |e| PipelineError::Compilation(format!("{context}: {e}"))
}

fn execution(e: ort::Error) -> PipelineError {
    PipelineError::Execution(e.to_string())
}

fn missing_buffer(spec: &BindingSpec) -> PipelineError {
    PipelineError::Configuration(format!(
        "no device buffer bound for `{}` (index {})",
        spec.name.as_str(),
        spec.index
    ))
}
