use visionport_core::{
    compute_capability_has_fast_fp16, BindingDirection, BindingSet, BindingSpec, DType, Device,
    DeviceAllocator, IOName, PipelineError, Shape,
};

fn binding(index: usize, name: &str, direction: BindingDirection, dims: &[usize]) -> BindingSpec {
    BindingSpec {
        index,
        name: IOName(name.to_string()),
        direction,
        dtype: DType::F32,
        shape: Shape::from_slice(dims),
    }
}

#[test]
fn parses_devices() {
    assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
    assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
    assert_eq!(
        "cuda:1".parse::<Device>().unwrap(),
        Device::Cuda { device_id: 1 }
    );
    assert!("cuda:x".parse::<Device>().is_err());
    assert!("tpu".parse::<Device>().is_err());
}

#[cfg(not(feature = "cuda"))]
#[test]
fn cuda_without_feature_is_a_device_error() {
    let err = DeviceAllocator::new(Device::Cuda { device_id: 0 }).unwrap_err();
    assert!(matches!(err, PipelineError::Device(_)));
}

#[test]
fn cpu_never_reports_fast_fp16() {
    assert!(!DeviceAllocator::cpu().supports_fast_fp16());
}

#[test]
fn fast_fp16_compute_capabilities() {
    assert!(compute_capability_has_fast_fp16(5, 3));
    assert!(compute_capability_has_fast_fp16(6, 0));
    assert!(!compute_capability_has_fast_fp16(6, 1));
    assert!(compute_capability_has_fast_fp16(7, 5));
    assert!(compute_capability_has_fast_fp16(8, 9));
    assert!(!compute_capability_has_fast_fp16(5, 2));
}

#[test]
fn buffer_is_sized_from_shape_and_batch() {
    let allocator = DeviceAllocator::cpu();
    let spec = binding(0, "input", BindingDirection::Input, &[1, 3, 4, 4]);

    let buffer = allocator.allocate(&spec, 1).unwrap();
    assert_eq!(buffer.len(), 48);
    assert_eq!(buffer.byte_len(), 48 * 4);
    assert_eq!(buffer.direction(), BindingDirection::Input);
    assert_eq!(allocator.live_buffers(), 1);

    drop(buffer);
    assert_eq!(allocator.live_buffers(), 0);
}

#[test]
fn zero_sized_binding_is_rejected() {
    let allocator = DeviceAllocator::cpu();
    let spec = binding(0, "input", BindingDirection::Input, &[1, 0, 4, 4]);
    let err = allocator.allocate(&spec, 1).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(allocator.live_buffers(), 0);
}

#[test]
fn writes_are_bounds_checked() {
    let allocator = DeviceAllocator::cpu();
    let spec = binding(0, "input", BindingDirection::Input, &[1, 2, 2]);
    let mut buffer = allocator.allocate(&spec, 1).unwrap();

    buffer.write(2, &[1.0, 2.0]).unwrap();
    assert_eq!(buffer.read().unwrap(), vec![0.0, 0.0, 1.0, 2.0]);
    assert_eq!(buffer.elements_written(), 2);

    assert!(buffer.write(3, &[1.0, 2.0]).is_err());
    assert!(buffer.write(usize::MAX, &[1.0]).is_err());
    assert_eq!(buffer.elements_written(), 2);
}

#[test]
fn binding_set_classifies_directions() {
    let allocator = DeviceAllocator::cpu();
    let specs = vec![
        binding(0, "input", BindingDirection::Input, &[1, 3, 4, 4]),
        binding(1, "logits", BindingDirection::Output, &[1, 10]),
    ];
    let mut set = BindingSet::allocate(&allocator, &specs, 1).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.input_count(), 1);
    assert_eq!(set.output_count(), 1);
    assert_eq!(set.first_output().unwrap().len(), 10);
    assert_eq!(set.first_input_mut().unwrap().index(), 0);
    assert_eq!(set.total_bytes(), (48 + 10) * 4);
    set.ensure_runnable().unwrap();
    assert_eq!(allocator.live_buffers(), 2);

    drop(set);
    assert_eq!(allocator.live_buffers(), 0);
}

#[test]
fn binding_set_without_outputs_is_not_runnable_and_still_releases() {
    let allocator = DeviceAllocator::cpu();
    let specs = vec![binding(0, "input", BindingDirection::Input, &[1, 3, 4, 4])];
    {
        let set = BindingSet::allocate(&allocator, &specs, 1).unwrap();
        let err = set.ensure_runnable().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(allocator.live_buffers(), 1);
    }
    assert_eq!(allocator.live_buffers(), 0);
}

#[test]
fn failed_allocation_releases_earlier_buffers() {
    let allocator = DeviceAllocator::cpu();
    let specs = vec![
        binding(0, "input", BindingDirection::Input, &[1, 3, 4, 4]),
        binding(1, "broken", BindingDirection::Output, &[1, 0]),
    ];
    assert!(BindingSet::allocate(&allocator, &specs, 1).is_err());
    assert_eq!(allocator.live_buffers(), 0);
}
