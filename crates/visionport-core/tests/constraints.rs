use visionport_core::{
    BuildConstraints, OptimizationProfile, PipelineError, Precision, PrecisionHint, Shape,
    DEFAULT_WORKSPACE_BYTES,
};

#[test]
fn fixed_profile_defaults() {
    let c = BuildConstraints::fixed("input_tensor:0", Shape::from_slice(&[1, 3, 224, 224]));
    assert!(c.profile.is_fixed());
    assert_eq!(c.max_batch, 1);
    assert_eq!(c.workspace_bytes, DEFAULT_WORKSPACE_BYTES);
    assert_eq!(c.precision_hint, PrecisionHint::PreferReduced);
    c.validate().unwrap();
}

#[test]
fn dynamic_profile_is_rejected() {
    let mut c = BuildConstraints::fixed("input", Shape::from_slice(&[1, 3, 224, 224]));
    c.profile = OptimizationProfile {
        min: Shape::from_slice(&[1, 3, 224, 224]),
        opt: Shape::from_slice(&[1, 3, 224, 224]),
        max: Shape::from_slice(&[1, 3, 512, 512]),
    };
    assert!(matches!(c.validate(), Err(PipelineError::Configuration(_))));
}

#[test]
fn batch_above_one_is_rejected() {
    let c = BuildConstraints::fixed("input", Shape::from_slice(&[4, 3, 224, 224]));
    assert!(matches!(c.validate(), Err(PipelineError::Configuration(_))));
}

#[test]
fn empty_shape_or_budget_is_rejected() {
    let c = BuildConstraints::fixed("input", Shape::from_slice(&[1, 0, 224, 224]));
    assert!(c.validate().is_err());

    let c = BuildConstraints::fixed("input", Shape::from_slice(&[1, 3, 2, 2])).with_workspace_bytes(0);
    assert!(c.validate().is_err());

    let c = BuildConstraints::fixed("", Shape::from_slice(&[1, 3, 2, 2]));
    assert!(c.validate().is_err());
}

#[test]
fn precision_follows_hint_and_probe() {
    assert_eq!(Precision::resolve(PrecisionHint::PreferReduced, true), Precision::F16);
    assert_eq!(Precision::resolve(PrecisionHint::PreferReduced, false), Precision::F32);
    assert_eq!(Precision::resolve(PrecisionHint::Full, true), Precision::F32);
    assert_eq!(Precision::resolve(PrecisionHint::Full, false), Precision::F32);
    assert_eq!(Precision::F16.to_string(), "fp16");
}
