use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::{BindingDirection, BindingSpec, IOName, PipelineError, Result, Shape};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self> {
        if raw.eq_ignore_ascii_case("cpu") {
            return Ok(Device::Cpu);
        }

        if let Some(rest) = raw.strip_prefix("cuda:") {
            let device_id: u32 = rest.parse().map_err(|_| {
                PipelineError::Configuration(format!("invalid cuda device id: {rest}"))
            })?;
            return Ok(Device::Cuda { device_id });
        }

        Err(PipelineError::Configuration(format!(
            "unsupported device: {raw} (expected cpu or cuda:N)"
        )))
    }
}

/// Hands out accelerator memory and keeps count of what is still alive.
///
/// On `Device::Cpu` system memory stands in for device memory so the rest of
/// the pipeline is exercised identically.
#[derive(Clone)]
pub struct DeviceAllocator {
    device: Device,
    live: Arc<AtomicUsize>,
    allocated: Arc<AtomicUsize>,
    #[cfg(feature = "cuda")]
    cuda: Option<Arc<cudarc::driver::CudaDevice>>,
}

impl fmt::Debug for DeviceAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAllocator")
            .field("device", &self.device)
            .field("live_buffers", &self.live_buffers())
            .field("total_allocations", &self.total_allocations())
            .finish()
    }
}

impl DeviceAllocator {
    pub fn new(device: Device) -> Result<Self> {
        match device {
            Device::Cpu => Ok(Self::cpu()),
            Device::Cuda { device_id } => Self::cuda(device_id),
        }
    }

    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            live: Arc::new(AtomicUsize::new(0)),
            allocated: Arc::new(AtomicUsize::new(0)),
            #[cfg(feature = "cuda")]
            cuda: None,
        }
    }

    #[cfg(feature = "cuda")]
    fn cuda(device_id: u32) -> Result<Self> {
        let handle = cudarc::driver::CudaDevice::new(device_id as usize)
            .map_err(|e| PipelineError::Device(format!("failed to open cuda:{device_id}: {e}")))?;
        Ok(Self {
            device: Device::Cuda { device_id },
            live: Arc::new(AtomicUsize::new(0)),
            allocated: Arc::new(AtomicUsize::new(0)),
            cuda: Some(handle),
        })
    }

    #[cfg(not(feature = "cuda"))]
    fn cuda(device_id: u32) -> Result<Self> {
        Err(PipelineError::Device(format!(
            "cuda:{device_id} requested but visionport-core was built without the `cuda` feature"
        )))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of buffers handed out and not yet dropped.
    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of buffers ever handed out by this allocator.
    pub fn total_allocations(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Capability probe for fast half-precision arithmetic.
    pub fn supports_fast_fp16(&self) -> bool {
        #[cfg(feature = "cuda")]
        if let Some(handle) = &self.cuda {
            use cudarc::driver::sys::CUdevice_attribute;
            let major = handle
                .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)
                .unwrap_or(0);
            let minor = handle
                .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)
                .unwrap_or(0);
            return compute_capability_has_fast_fp16(major, minor);
        }
        false
    }

    /// Allocates a zeroed f32 buffer for `spec` sized `element_count(shape) * batch`.
    pub fn allocate(&self, spec: &BindingSpec, batch: usize) -> Result<DeviceBuffer> {
        let len = spec.shape.element_count() * batch;
        if len == 0 {
            return Err(PipelineError::Configuration(format!(
                "binding `{}` with shape {} and batch {batch} has no elements",
                spec.name.as_str(),
                spec.shape
            )));
        }

        let storage = self.alloc_storage(len)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.allocated.fetch_add(1, Ordering::SeqCst);
        debug!(
            binding = spec.name.as_str(),
            index = spec.index,
            direction = ?spec.direction,
            bytes = len * std::mem::size_of::<f32>(),
            "allocated device buffer"
        );

        Ok(DeviceBuffer {
            index: spec.index,
            name: spec.name.clone(),
            direction: spec.direction,
            shape: spec.shape.clone(),
            len,
            elements_written: 0,
            storage,
            live: Arc::clone(&self.live),
        })
    }

    fn alloc_storage(&self, len: usize) -> Result<DeviceStorage> {
        #[cfg(feature = "cuda")]
        if let Some(handle) = &self.cuda {
            let slice = handle
                .alloc_zeros::<f32>(len)
                .map_err(|e| PipelineError::Device(format!("device allocation failed: {e}")))?;
            return Ok(DeviceStorage::Cuda {
                device: Arc::clone(handle),
                slice,
            });
        }
        Ok(DeviceStorage::Host(vec![0.0; len]))
    }
}

/// Fast fp16 exists on sm_53, sm_60, sm_62 and everything from sm_70 on.
/// sm_61 parts run half precision at a fraction of fp32 throughput.
pub fn compute_capability_has_fast_fp16(major: i32, minor: i32) -> bool {
    matches!((major, minor), (5, 3) | (6, 0) | (6, 2)) || major >= 7
}

enum DeviceStorage {
    Host(Vec<f32>),
    #[cfg(feature = "cuda")]
    Cuda {
        device: Arc<cudarc::driver::CudaDevice>,
        slice: cudarc::driver::CudaSlice<f32>,
    },
}

/// A region of accelerator memory bound to one engine binding.
/// Dropping it releases the memory.
pub struct DeviceBuffer {
    index: usize,
    name: IOName,
    direction: BindingDirection,
    shape: Shape,
    len: usize,
    elements_written: usize,
    storage: DeviceStorage,
    live: Arc<AtomicUsize>,
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("shape", &self.shape)
            .field("len", &self.len)
            .finish()
    }
}

impl DeviceBuffer {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &IOName {
        &self.name
    }

    pub fn direction(&self) -> BindingDirection {
        self.direction
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Capacity in f32 elements (shape elements times batch).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len * std::mem::size_of::<f32>()
    }

    /// Total elements transferred host-to-device since allocation.
    pub fn elements_written(&self) -> usize {
        self.elements_written
    }

    /// Host-to-device copy of `data` starting at element `offset`.
    pub fn write(&mut self, offset: usize, data: &[f32]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "write of {} elements at offset {offset} overruns binding `{}` ({} elements)",
                    data.len(),
                    self.name.as_str(),
                    self.len
                ))
            })?;

        match &mut self.storage {
            DeviceStorage::Host(host) => host[offset..end].copy_from_slice(data),
            #[cfg(feature = "cuda")]
            DeviceStorage::Cuda { device, slice } => {
                let mut view = slice.slice_mut(offset..end);
                device
                    .htod_sync_copy_into(data, &mut view)
                    .map_err(|e| PipelineError::Device(format!("host-to-device copy failed: {e}")))?;
            }
        }
        self.elements_written += data.len();
        trace!(binding = self.name.as_str(), offset, len = data.len(), "buffer write");
        Ok(())
    }

    /// Device-to-host copy of the whole buffer.
    pub fn read(&self) -> Result<Vec<f32>> {
        match &self.storage {
            DeviceStorage::Host(host) => Ok(host.clone()),
            #[cfg(feature = "cuda")]
            DeviceStorage::Cuda { device, slice } => device
                .dtoh_sync_copy(slice)
                .map_err(|e| PipelineError::Device(format!("device-to-host copy failed: {e}"))),
        }
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        trace!(binding = self.name.as_str(), index = self.index, "released device buffer");
    }
}
