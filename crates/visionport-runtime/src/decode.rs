use std::cmp::Ordering;
use std::fmt;

use tracing::debug;
use visionport_core::{DeviceBuffer, LabelTable, PipelineError, Result, Shape};

/// Predictions at or below 0.5% are not reported.
pub const CONFIDENCE_THRESHOLD: f32 = 0.005;

#[derive(Clone, Debug, PartialEq)]
pub struct PredictionEntry {
    pub index: usize,
    pub confidence_percent: f32,
    pub class_name: Option<String>,
}

impl fmt::Display for PredictionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.class_name {
            write!(f, "class: {name} | ")?;
        }
        write!(
            f,
            "confidence: {}% | index: {}",
            self.confidence_percent, self.index
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedOutput {
    pub probabilities: Vec<f32>,
    pub predictions: Vec<PredictionEntry>,
}

/// Turns raw output scores into a thresholded, ranked prediction list.
#[derive(Clone, Copy, Debug)]
pub struct ResultDecoder {
    threshold: f32,
}

impl Default for ResultDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultDecoder {
    pub fn new() -> Self {
        Self {
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Reads `element_count(shape) * batch` scores back from the device and
    /// decodes them.
    pub fn decode(
        &self,
        buffer: &DeviceBuffer,
        shape: &Shape,
        batch: usize,
        labels: &LabelTable,
    ) -> Result<DecodedOutput> {
        let expected = shape.element_count() * batch;
        let scores = buffer.read()?;
        if scores.len() != expected {
            return Err(PipelineError::Configuration(format!(
                "output `{}` holds {} scores, shape {shape} x batch {batch} needs {expected}",
                buffer.name().as_str(),
                scores.len()
            )));
        }
        Ok(self.decode_scores(&scores, labels))
    }

    pub fn decode_scores(&self, scores: &[f32], labels: &LabelTable) -> DecodedOutput {
        let probabilities = softmax(scores);
        let predictions = select(&probabilities, labels, self.threshold);
        debug!(
            classes = probabilities.len(),
            emitted = predictions.len(),
            "decoded output"
        );
        DecodedOutput {
            probabilities,
            predictions,
        }
    }
}

/// `exp(x_i) / sum(exp(x))`, shifted by the maximum for numerical range.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let Some(max) = scores.iter().copied().reduce(f32::max) else {
        return Vec::new();
    };
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Indices by descending value. Equal values keep index order;
/// NaN goes last.
pub fn rank(values: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| descending(values[a], values[b]));
    indices
}

fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Walks the ranking and stops at the first probability not above `threshold`.
pub fn select(probabilities: &[f32], labels: &LabelTable, threshold: f32) -> Vec<PredictionEntry> {
    rank(probabilities)
        .into_iter()
        .take_while(|&i| probabilities[i] > threshold)
        .map(|index| PredictionEntry {
            index,
            confidence_percent: probabilities[index] * 100.0,
            class_name: labels.get(index).map(str::to_owned),
        })
        .collect()
}
