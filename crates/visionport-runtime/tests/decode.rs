use anyhow::Result;
use visionport_core::{
    BindingDirection, BindingSpec, DType, DeviceAllocator, IOName, LabelTable, PipelineError,
    Shape,
};
use visionport_runtime::{rank, select, softmax, PredictionEntry, ResultDecoder, CONFIDENCE_THRESHOLD};

#[test]
fn softmax_is_a_distribution() {
    for scores in [
        vec![2.0f32, 5.0, 5.0, 1.0],
        vec![-3.0, 0.0, 12.5],
        vec![0.0],
        vec![100.0, 100.0, -100.0],
        (0..1000).map(|i| (i as f32 * 0.37).sin() * 8.0).collect(),
    ] {
        let p = softmax(&scores);
        assert_eq!(p.len(), scores.len());
        assert!(p.iter().all(|&v| v >= 0.0));
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum was {sum}");
    }
}

#[test]
fn softmax_of_nothing_is_nothing() {
    assert!(softmax(&[]).is_empty());
}

#[test]
fn softmax_matches_plain_exponentials() {
    let p = softmax(&[1.0, 2.0, 3.0]);
    let e: Vec<f32> = [1.0f32, 2.0, 3.0].iter().map(|v| v.exp()).collect();
    let sum: f32 = e.iter().sum();
    for (got, want) in p.iter().zip(e.iter().map(|v| v / sum)) {
        assert!((got - want).abs() < 1e-6);
    }
}

#[test]
fn ties_keep_first_occurrence_first() {
    assert_eq!(rank(&[2.0, 5.0, 5.0, 1.0]), vec![1, 2, 0, 3]);
    assert_eq!(rank(&softmax(&[2.0, 5.0, 5.0, 1.0])), vec![1, 2, 0, 3]);
    assert_eq!(rank(&[1.0, 1.0, 1.0]), vec![0, 1, 2]);
}

#[test]
fn nan_ranks_last() {
    assert_eq!(rank(&[f32::NAN, 0.2, 0.7]), vec![2, 1, 0]);
}

#[test]
fn emits_while_above_threshold() {
    let labels = LabelTable::default();
    let entries = select(&[0.6, 0.3, 0.09, 0.009, 0.001], &labels, CONFIDENCE_THRESHOLD);
    let indices: Vec<usize> = entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn stops_at_first_entry_not_above_threshold() {
    let labels = LabelTable::default();
    let entries = select(&[0.005, 0.99, 0.004], &labels, CONFIDENCE_THRESHOLD);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].index, 1);
}

#[test]
fn everything_above_threshold_is_emitted_without_overrun() {
    let labels = LabelTable::default();
    let entries = select(&[0.5, 0.5], &labels, CONFIDENCE_THRESHOLD);
    assert_eq!(entries.len(), 2);
}

#[test]
fn names_only_within_label_bounds() {
    let labels = LabelTable::new(vec!["tench".into(), "goldfish".into()]);
    let entries = select(&[0.1, 0.2, 0.7], &labels, CONFIDENCE_THRESHOLD);

    assert_eq!(entries[0].index, 2);
    assert_eq!(entries[0].class_name, None);
    assert_eq!(entries[1].class_name.as_deref(), Some("goldfish"));
    assert_eq!(entries[2].class_name.as_deref(), Some("tench"));
    assert!((entries[0].confidence_percent - 70.0).abs() < 1e-4);
}

#[test]
fn renders_console_lines() {
    let named = PredictionEntry {
        index: 3,
        confidence_percent: 42.5,
        class_name: Some("espresso".into()),
    };
    assert_eq!(named.to_string(), "class: espresso | confidence: 42.5% | index: 3");

    let unnamed = PredictionEntry {
        index: 1001,
        confidence_percent: 1.5,
        class_name: None,
    };
    assert_eq!(unnamed.to_string(), "confidence: 1.5% | index: 1001");
}

#[test]
fn decodes_device_buffer() -> Result<()> {
    let allocator = DeviceAllocator::cpu();
    let shape = Shape::from_slice(&[1, 4]);
    let spec = BindingSpec {
        index: 1,
        name: IOName("logits".into()),
        direction: BindingDirection::Output,
        dtype: DType::F32,
        shape: shape.clone(),
    };
    let mut buffer = allocator.allocate(&spec, 1)?;
    buffer.write(0, &[2.0, 5.0, 5.0, 1.0])?;

    let labels = LabelTable::new(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
    let decoded = ResultDecoder::new().decode(&buffer, &shape, 1, &labels)?;

    let sum: f32 = decoded.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    let order: Vec<usize> = decoded.predictions.iter().map(|p| p.index).collect();
    assert_eq!(order, vec![1, 2, 0, 3]);
    assert_eq!(decoded.predictions[0].class_name.as_deref(), Some("b"));
    Ok(())
}

#[test]
fn shape_and_buffer_disagreement_is_rejected() -> Result<()> {
    let spec = BindingSpec {
        index: 1,
        name: IOName("logits".into()),
        direction: BindingDirection::Output,
        dtype: DType::F32,
        shape: Shape::from_slice(&[1, 4]),
    };
    let buffer = DeviceAllocator::cpu().allocate(&spec, 1)?;
    let err = ResultDecoder::new()
        .decode(&buffer, &Shape::from_slice(&[1, 10]), 1, &LabelTable::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    Ok(())
}

#[test]
fn custom_threshold() {
    let decoder = ResultDecoder::with_threshold(0.25);
    let decoded = decoder.decode_scores(&[0.0, 0.0, 3.0], &LabelTable::default());
    assert_eq!(decoded.predictions.len(), 1);
    assert_eq!(decoder.threshold(), 0.25);
}
