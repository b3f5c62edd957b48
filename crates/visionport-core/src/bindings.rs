use crate::{BindingDirection, BindingSpec, DeviceAllocator, DeviceBuffer, PipelineError, Result};

/// One device buffer per engine binding, ordered by binding index.
///
/// Owns its buffers: dropping the set (including on an early `?` return)
/// releases every allocation made so far.
#[derive(Debug)]
pub struct BindingSet {
    buffers: Vec<DeviceBuffer>,
}

impl BindingSet {
    pub fn allocate(
        allocator: &DeviceAllocator,
        specs: &[BindingSpec],
        batch: usize,
    ) -> Result<Self> {
        let mut buffers = Vec::with_capacity(specs.len());
        for spec in specs {
            buffers.push(allocator.allocate(spec, batch)?);
        }
        Ok(Self { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceBuffer> {
        self.buffers.iter().find(|b| b.index() == index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DeviceBuffer> {
        self.buffers.iter_mut().find(|b| b.index() == index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceBuffer> {
        self.buffers.iter()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &DeviceBuffer> {
        self.by_direction(BindingDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &DeviceBuffer> {
        self.by_direction(BindingDirection::Output)
    }

    pub fn input_count(&self) -> usize {
        self.inputs().count()
    }

    pub fn output_count(&self) -> usize {
        self.outputs().count()
    }

    pub fn first_input_mut(&mut self) -> Option<&mut DeviceBuffer> {
        self.buffers
            .iter_mut()
            .find(|b| b.direction() == BindingDirection::Input)
    }

    pub fn first_output(&self) -> Option<&DeviceBuffer> {
        self.outputs().next()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(DeviceBuffer::byte_len).sum()
    }

    /// A runnable set has at least one input and one output binding.
    pub fn ensure_runnable(&self) -> Result<()> {
        let (inputs, outputs) = (self.input_count(), self.output_count());
        if inputs == 0 || outputs == 0 {
            return Err(PipelineError::Configuration(format!(
                "expected at least one input and one output binding, got {inputs} input(s) and {outputs} output(s)"
            )));
        }
        Ok(())
    }

    fn by_direction(&self, direction: BindingDirection) -> impl Iterator<Item = &DeviceBuffer> {
        self.buffers
            .iter()
            .filter(move |b| b.direction() == direction)
    }
}
