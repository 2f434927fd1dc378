//! Frame ingestion.
//!
//! The node reads frames through the `FrameSource` trait. The only production
//! source is a local V4L2 capture device streaming MJPEG; `stub://` device paths
//! select a synthetic source so the node runs without hardware.
//!
//! Sources are opened once during node initialization, read once per tick, and
//! released exactly once at shutdown. A failed `read` is recoverable: the tick is
//! skipped and the source is read again on the next tick. Sources are never
//! re-opened by the node.

mod mjpeg;
pub mod v4l2;

pub use mjpeg::decode_mjpeg;
pub use v4l2::{CaptureConfig, V4l2Source};

use anyhow::Result;

use crate::frame::Frame;

/// A capture device that yields decoded frames.
pub trait FrameSource {
    /// Human-readable identifier (device path) for logs.
    fn describe(&self) -> String;

    /// Read the next frame.
    ///
    /// An error means no frame is available for this tick (device busy,
    /// dropped buffer, corrupt JPEG). Callers treat it as recoverable.
    fn read(&mut self) -> Result<Frame>;

    /// Release the underlying device handle.
    ///
    /// Must be safe to call more than once; calls after the first do nothing.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn read(&mut self) -> Result<Frame> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
