//! Detection loop controller.
//!
//! `DetectionNode` owns the publish channel, the detector, the capture device
//! and the optional display surface in one `NodeContext`. A single thread runs
//! `on_tick` at a fixed period:
//!
//! 1. read one frame (a failed read logs a warning and ends the tick)
//! 2. run the detector and resolve class names
//! 3. keep the highest-confidence detection
//! 4. publish `"<class> <conf:.2>"` when there is one
//! 5. optionally show the annotated frame
//!
//! Ticks never overlap; a shutdown request is honored between ticks only.

pub mod signal;
pub mod timer;

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::config::NodeConfig;
use crate::detect::{self, best_detection, DetectorBackend};
use crate::display::{DisplaySurface, SnapshotDisplay};
use crate::ingest::{FrameSource, V4l2Source};
use crate::transport::{MqttPublisher, Publisher};

use signal::{ShutdownSignal, Wait};
use timer::TickTimer;

/// Node lifecycle.
///
/// `Uninitialized -> Running -> ShuttingDown -> Terminated`, or
/// `Uninitialized -> FailedInit -> Terminated` when startup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Running,
    ShuttingDown,
    FailedInit,
    Terminated,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame source had nothing; detector and publisher were not called.
    NoFrame,
    /// Detector ran and found nothing.
    Silent,
    /// The message that was published.
    Published(String),
}

/// Loop parameters that are not collaborators.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub tick_period: Duration,
    pub max_consecutive_read_failures: u32,
    pub stats_interval: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self::from(&NodeConfig::default())
    }
}

impl From<&NodeConfig> for NodeSettings {
    fn from(cfg: &NodeConfig) -> Self {
        Self {
            tick_period: cfg.tick_period,
            max_consecutive_read_failures: cfg.max_consecutive_read_failures,
            stats_interval: cfg.stats_interval,
        }
    }
}

/// Running counters, logged periodically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub published: u64,
    pub silent: u64,
    pub read_failures: u64,
    pub consecutive_read_failures: u32,
}

/// Everything a tick touches, owned exclusively by the node.
pub struct NodeContext {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    publisher: Box<dyn Publisher>,
    display: Option<Box<dyn DisplaySurface>>,
    max_consecutive_read_failures: u32,
    stats: TickStats,
}

impl NodeContext {
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}

/// Run one tick against the context.
///
/// Read failures are recoverable and return `TickOutcome::NoFrame` unless the
/// configured consecutive-failure limit is reached. Detector and publisher
/// errors are returned as-is.
pub fn on_tick(ctx: &mut NodeContext) -> Result<TickOutcome> {
    ctx.stats.ticks += 1;

    let frame = match ctx.source.read() {
        Ok(frame) => frame,
        Err(err) => {
            ctx.stats.read_failures += 1;
            ctx.stats.consecutive_read_failures += 1;
            log::warn!("No image from camera: {:#}", err);
            let limit = ctx.max_consecutive_read_failures;
            if limit > 0 && ctx.stats.consecutive_read_failures >= limit {
                return Err(anyhow!(
                    "{} consecutive frame reads failed on {}",
                    ctx.stats.consecutive_read_failures,
                    ctx.source.describe()
                ));
            }
            return Ok(TickOutcome::NoFrame);
        }
    };
    ctx.stats.consecutive_read_failures = 0;

    let raw = ctx
        .detector
        .detect(&frame)
        .with_context(|| format!("detector '{}' failed", ctx.detector.name()))?;
    let detections = ctx.detector.class_names().resolve(&raw);
    let best = best_detection(&detections);

    let outcome = match best {
        Some(best) => {
            let msg = best.message();
            ctx.publisher
                .publish(&msg)
                .with_context(|| format!("publish on '{}' failed", ctx.publisher.topic()))?;
            log::info!("Publishing: {}", msg);
            ctx.stats.published += 1;
            TickOutcome::Published(msg)
        }
        None => {
            ctx.stats.silent += 1;
            TickOutcome::Silent
        }
    };

    if let Some(display) = ctx.display.as_mut() {
        if let Err(err) = display.show(&frame, &detections, best) {
            log::debug!("display update failed: {:#}", err);
        }
    }

    Ok(outcome)
}

/// The detection node.
pub struct DetectionNode {
    state: NodeState,
    context: NodeContext,
    settings: NodeSettings,
}

impl DetectionNode {
    /// Acquire collaborators in order: publish channel, model, capture device.
    ///
    /// If a later step fails, everything acquired so far is released before
    /// the error is returned. Nothing is retried.
    pub fn initialize<P, D, S>(
        settings: NodeSettings,
        open_publisher: P,
        load_detector: D,
        open_source: S,
        display: Option<Box<dyn DisplaySurface>>,
    ) -> Result<Self>
    where
        P: FnOnce() -> Result<Box<dyn Publisher>>,
        D: FnOnce() -> Result<Box<dyn DetectorBackend>>,
        S: FnOnce() -> Result<Box<dyn FrameSource>>,
    {
        let mut publisher = open_publisher()
            .context("open publish channel")
            .map_err(init_failed)?;

        let detector = match load_detector().context("load detection model") {
            Ok(detector) => detector,
            Err(err) => {
                publisher.close();
                return Err(init_failed(err));
            }
        };

        let source = match open_source().context("open frame source") {
            Ok(source) => source,
            Err(err) => {
                publisher.close();
                return Err(init_failed(err));
            }
        };

        log::info!(
            "node running: source={} detector={} topic={} period={:?}",
            source.describe(),
            detector.name(),
            publisher.topic(),
            settings.tick_period
        );

        Ok(Self {
            state: NodeState::Running,
            context: NodeContext {
                source,
                detector,
                publisher,
                display,
                max_consecutive_read_failures: settings.max_consecutive_read_failures,
                stats: TickStats::default(),
            },
            settings,
        })
    }

    /// Build the production node from configuration.
    pub fn from_config(cfg: &NodeConfig) -> Result<Self> {
        let display = cfg.snapshot_path.as_ref().map(|path| {
            log::info!("display: writing annotated frames to {}", path.display());
            Box::new(SnapshotDisplay::new(path)) as Box<dyn DisplaySurface>
        });
        Self::initialize(
            NodeSettings::from(cfg),
            || Ok(Box::new(MqttPublisher::connect(&cfg.publisher)?) as Box<dyn Publisher>),
            || detect::load_backend(&cfg.model),
            || Ok(Box::new(V4l2Source::open(cfg.camera.clone())?) as Box<dyn FrameSource>),
            display,
        )
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn stats(&self) -> &TickStats {
        self.context.stats()
    }

    /// Run a single tick immediately.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.state != NodeState::Running {
            return Err(anyhow!("node is not running ({:?})", self.state));
        }
        on_tick(&mut self.context)
    }

    /// Tick at the configured period until shutdown is requested or a tick
    /// fails. Shuts the node down before returning either way.
    pub fn spin(&mut self, shutdown: &mut ShutdownSignal) -> Result<()> {
        let mut timer = TickTimer::new(self.settings.tick_period, Instant::now());
        let mut last_stats_log = Instant::now();

        let result = loop {
            if shutdown.wait_until(timer.next_deadline()) == Wait::ShutdownRequested {
                log::info!("shutdown requested, stopping detection loop");
                break Ok(());
            }
            if let Err(err) = self.tick() {
                break Err(err);
            }
            timer.complete(Instant::now());

            if last_stats_log.elapsed() >= self.settings.stats_interval {
                let stats = self.stats();
                log::info!(
                    "stats: ticks={} published={} silent={} read_failures={} late_ticks={}",
                    stats.ticks,
                    stats.published,
                    stats.silent,
                    stats.read_failures,
                    timer.late_ticks()
                );
                last_stats_log = Instant::now();
            }
        };

        self.shutdown();
        result
    }

    /// Release the capture device, close the display, then close the publish
    /// channel. Only the first call does anything.
    pub fn shutdown(&mut self) {
        if self.state != NodeState::Running {
            return;
        }
        self.state = NodeState::ShuttingDown;
        log::info!("node shutting down");

        self.context.source.release();
        if let Some(display) = self.context.display.as_mut() {
            display.close();
        }
        self.context.publisher.close();

        self.state = NodeState::Terminated;
        log::info!("node terminated");
    }
}

fn init_failed(err: anyhow::Error) -> anyhow::Error {
    log::error!(
        "node initialization failed ({:?} -> {:?}): {:#}",
        NodeState::FailedInit,
        NodeState::Terminated,
        err
    );
    err
}

impl Drop for DetectionNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}
