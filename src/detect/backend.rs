use anyhow::Result;

use crate::detect::result::{ClassNames, RawDetection};
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend wraps one loaded model. It is created once at node startup and
/// owned exclusively by the node; `detect` is never called concurrently.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class id to name mapping shipped with the model.
    fn class_names(&self) -> &ClassNames;

    /// Run detection on a frame.
    ///
    /// Returns zero or more detections in the backend's own order. Errors are
    /// not expected in normal operation and stop the node.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn class_names(&self) -> &ClassNames {
        (**self).class_names()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
