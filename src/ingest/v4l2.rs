//! V4L2 frame source.
//!
//! `V4l2Source` opens a local capture device (e.g. /dev/video0), requests the
//! MJPEG pixel format at the configured resolution, and decodes each captured
//! buffer to RGB24. Device paths starting with `stub://` select a synthetic
//! source that needs no hardware (and no `ingest-v4l2` feature).

use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::Frame;

/// Capture settings for a V4L2 source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device path (e.g. "/dev/video0") or `stub://<name>`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Requested pixel format. Only MJPEG is decoded.
    pub fourcc: [u8; 4],
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
            fourcc: *b"MJPG",
        }
    }
}

/// V4L2 frame source.
pub struct V4l2Source {
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticV4l2Source),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl V4l2Source {
    /// Open the capture device and configure its format.
    ///
    /// Fails when the device cannot be opened, when the driver refuses MJPEG,
    /// or when the crate was built without `ingest-v4l2` and the path is not
    /// a `stub://` path.
    pub fn open(config: CaptureConfig) -> Result<Self> {
        if &config.fourcc != b"MJPG" {
            return Err(anyhow!(
                "unsupported capture format {}: only MJPG is decoded",
                String::from_utf8_lossy(&config.fourcc)
            ));
        }
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: V4l2Backend::Synthetic(SyntheticV4l2Source::open(config)),
            });
        }
        Self::open_device(config)
    }

    #[cfg(feature = "ingest-v4l2")]
    fn open_device(config: CaptureConfig) -> Result<Self> {
        Ok(Self {
            backend: V4l2Backend::Device(DeviceV4l2Source::open(config)?),
        })
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn open_device(config: CaptureConfig) -> Result<Self> {
        Err(anyhow!(
            "cannot open {}: built without the 'ingest-v4l2' feature (use a stub:// device or rebuild with --features ingest-v4l2)",
            config.device
        ))
    }

    /// Frames successfully read so far.
    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.frame_count,
        }
    }

    pub fn is_released(&self) -> bool {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.released,
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.state.is_none(),
        }
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        match &self.backend {
            V4l2Backend::Synthetic(source) => format!("{} (synthetic)", source.config.device),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.config.device.clone(),
        }
    }

    fn read(&mut self) -> Result<Frame> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.read(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.read(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.release(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.release(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticV4l2Source {
    config: CaptureConfig,
    frame_count: u64,
    released: bool,
}

impl SyntheticV4l2Source {
    fn open(config: CaptureConfig) -> Self {
        log::info!(
            "V4l2Source: opened {} ({}x{}, synthetic)",
            config.device,
            config.width,
            config.height
        );
        Self {
            config,
            frame_count: 0,
            released: false,
        }
    }

    fn read(&mut self) -> Result<Frame> {
        if self.released {
            return Err(anyhow!("{} has been released", self.config.device));
        }
        self.frame_count += 1;

        // Slow brightness ramp so the stub detector sees changing scenes.
        let level = ((self.frame_count * 5) % 256) as u8;
        Frame::filled(
            self.config.width,
            self.config.height,
            [level, level.wrapping_add(64), 255 - level],
            self.frame_count,
        )
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            log::info!("V4l2Source: released {}", self.config.device);
        }
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceV4l2Source {
    config: CaptureConfig,
    state: Option<DeviceV4l2State>,
    frame_count: u64,
}

#[cfg(feature = "ingest-v4l2")]
#[ouroboros::self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceV4l2Source {
    fn open(config: CaptureConfig) -> Result<Self> {
        use anyhow::Context;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(&config.fourcc);

        let format = device
            .set_format(&format)
            .with_context(|| format!("set MJPEG {}x{} on {}", config.width, config.height, config.device))?;
        if format.fourcc != v4l::FourCC::new(&config.fourcc) {
            return Err(anyhow!(
                "{} does not support MJPEG (driver selected {})",
                config.device,
                format.fourcc
            ));
        }
        if format.width != config.width || format.height != config.height {
            log::warn!(
                "V4l2Source: {} negotiated {}x{} instead of {}x{}",
                config.device,
                format.width,
                format.height,
                config.width,
                config.height
            );
        }

        let state = DeviceV4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: opened {} ({}x{} MJPEG)",
            config.device,
            format.width,
            format.height
        );
        Ok(Self {
            config,
            state: Some(state),
            frame_count: 0,
        })
    }

    fn read(&mut self) -> Result<Frame> {
        use anyhow::Context;
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .with_context(|| format!("{} has been released", self.config.device))?;
        let sequence = self.frame_count + 1;
        let frame = state.with_mut(|fields| -> Result<Frame> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = (meta.bytesused as usize).min(buf.len());
            let used = if used == 0 { buf.len() } else { used };
            super::decode_mjpeg(&buf[..used], sequence)
        })?;
        self.frame_count = sequence;
        Ok(frame)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.device);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
