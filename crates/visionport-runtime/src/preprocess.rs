use std::path::Path;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use tracing::debug;
use visionport_core::{DeviceBuffer, PipelineError, Result, Shape};

/// ImageNet per-channel mean, RGB order.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet per-channel standard deviation, RGB order.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A normalized image in channel-major layout: every channel is one
/// contiguous `height * width` plane, planes back to back.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanarFrame {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl PlanarFrame {
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// `None` when `channel` is out of range.
    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        if channel >= self.channels {
            return None;
        }
        let len = self.plane_len();
        self.data.get(channel * len..(channel + 1) * len)
    }

    pub fn planes(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.plane_len())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decodes, resizes and normalizes images into the engine's input layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramePreprocessor;

impl FramePreprocessor {
    /// Host-only half of preprocessing. Touches no device memory, so a
    /// decode failure leaves nothing to clean up.
    pub fn prepare(image_path: &Path, input_shape: &Shape) -> Result<PlanarFrame> {
        chw_dims(input_shape)?;
        let image = image::open(image_path).map_err(|e| {
            PipelineError::Decode(format!(
                "input image {} load failed: {e}",
                image_path.display()
            ))
        })?;
        Self::prepare_image(&image, input_shape)
    }

    /// Nearest-neighbour resize to `(W, H)`, scale to [0, 1], standardize
    /// with the ImageNet constants, split into planes.
    pub fn prepare_image(image: &DynamicImage, input_shape: &Shape) -> Result<PlanarFrame> {
        let (channels, height, width) = chw_dims(input_shape)?;
        let (w, h) = (to_u32(width)?, to_u32(height)?);

        let rgb = image.to_rgb8();
        let resized = imageops::resize(&rgb, w, h, FilterType::Nearest);

        let plane_len = height * width;
        let mut data = vec![0.0f32; channels * plane_len];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..channels {
                let scaled = f32::from(pixel[c]) / 255.0;
                data[c * plane_len + i] = (scaled - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        debug!(
            source_width = image.width(),
            source_height = image.height(),
            width,
            height,
            "prepared input frame"
        );

        Ok(PlanarFrame {
            channels,
            height,
            width,
            data,
        })
    }

    /// Copies each plane to its offset `c * H * W` in `buffer`.
    pub fn upload(frame: &PlanarFrame, buffer: &mut DeviceBuffer) -> Result<()> {
        if frame.len() > buffer.len() {
            return Err(PipelineError::Configuration(format!(
                "frame of {} elements does not fit input binding `{}` ({} elements)",
                frame.len(),
                buffer.name().as_str(),
                buffer.len()
            )));
        }

        let plane_len = frame.plane_len();
        for (c, plane) in frame.planes().enumerate() {
            buffer.write(c * plane_len, plane)?;
        }
        Ok(())
    }
}

/// `[N, 3, H, W]` -> `(3, H, W)`.
fn chw_dims(shape: &Shape) -> Result<(usize, usize, usize)> {
    let &[_, channels, height, width] = shape.dims() else {
        return Err(PipelineError::Configuration(format!(
            "input shape {shape} is not NCHW"
        )));
    };
    if channels != IMAGENET_MEAN.len() {
        return Err(PipelineError::Configuration(format!(
            "input shape {shape} has {channels} channels, expected {}",
            IMAGENET_MEAN.len()
        )));
    }
    if height == 0 || width == 0 {
        return Err(PipelineError::Configuration(format!(
            "input shape {shape} has an empty spatial extent"
        )));
    }
    Ok((channels, height, width))
}

fn to_u32(dim: usize) -> Result<u32> {
    u32::try_from(dim)
        .map_err(|_| PipelineError::Configuration(format!("dimension {dim} is too large")))
}
