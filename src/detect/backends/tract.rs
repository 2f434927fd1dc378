#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassNames, RawDetection};
use crate::detect::yolo::{decode_yolov8, YoloParams};
use crate::frame::Frame;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Loads a local model file once and runs CPU inference on RGB frames. Frames
/// are resized (nearest neighbour, no letterbox) to the square model input.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    classes: ClassNames,
    params: YoloParams,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, classes: ClassNames, params: YoloParams) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = params.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            classes,
            params,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let size = self.params.input_size as usize;
        let sx = frame.width as f32 / size as f32;
        let sy = frame.height as f32 / size as f32;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            let src_x = ((x as f32 * sx) as u32).min(frame.width - 1);
            let src_y = ((y as f32 * sy) as u32).min(frame.height - 1);
            frame.pixel(src_x, src_y)[channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &ClassNames {
        &self.classes
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let (channels, anchors) = match shape.as_slice() {
            [1, channels, anchors] => (*channels, *anchors),
            other => return Err(anyhow!("unexpected YOLO output shape {:?}", other)),
        };
        let values: Vec<f32> = view.iter().copied().collect();
        decode_yolov8(&values, channels, anchors, &self.params)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.params.input_size;
        let frame = Frame::filled(size, size, [114, 114, 114], 0)?;
        self.detect(&frame).map(|_| ())
    }
}
