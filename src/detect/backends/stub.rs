use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassNames, RawDetection};
use crate::frame::Frame;

const STUB_CLASSES: [&str; 3] = ["apple", "banana", "orange"];

/// Luma below which the stub reports an empty scene.
const DARK_LUMA: f32 = 16.0;

/// Stub backend for dry runs and tests.
///
/// Reports nothing for dark frames, otherwise a single centred detection whose
/// confidence is the frame's mean luma scaled to 0..1 and whose class cycles
/// with the frame sequence number.
pub struct StubBackend {
    classes: ClassNames,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            classes: ClassNames::new(STUB_CLASSES),
        }
    }

    pub fn with_classes(classes: ClassNames) -> Self {
        Self { classes }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &ClassNames {
        &self.classes
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let luma = frame.mean_luma();
        if luma < DARK_LUMA {
            return Ok(Vec::new());
        }
        let class_count = self.classes.len().max(1) as u64;
        Ok(vec![RawDetection {
            class_id: (frame.sequence % class_count) as u32,
            confidence: (luma / 255.0).clamp(0.0, 1.0),
            bbox: [0.25, 0.25, 0.75, 0.75],
        }])
    }
}
