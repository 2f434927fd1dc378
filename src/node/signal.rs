use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

use anyhow::{anyhow, Result};

/// Outcome of waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    DeadlineReached,
    ShutdownRequested,
}

/// Cooperative shutdown request channel.
///
/// Requests only wake the loop between ticks. Once a request is observed it
/// stays observed; repeated requests are harmless.
pub struct ShutdownSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
    requested: bool,
}

/// Cloneable, `Send` handle that requests shutdown.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            requested: false,
        }
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            tx: self.tx.clone(),
        }
    }

    /// Route SIGINT/SIGTERM to this signal. Can be installed once per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let trigger = self.trigger();
        ctrlc::set_handler(move || {
            trigger.request();
        })
        .map_err(|e| anyhow!("failed to install signal handler: {}", e))
    }

    /// Non-blocking check for a pending request.
    pub fn is_requested(&mut self) -> bool {
        if !self.requested && self.rx.try_recv().is_ok() {
            self.requested = true;
        }
        self.requested
    }

    /// Sleep until `deadline` unless shutdown is requested first.
    pub fn wait_until(&mut self, deadline: Instant) -> Wait {
        if self.is_requested() {
            return Wait::ShutdownRequested;
        }
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(timeout) {
            Ok(()) => {
                self.requested = true;
                Wait::ShutdownRequested
            }
            Err(RecvTimeoutError::Timeout) => Wait::DeadlineReached,
            // We hold a sender ourselves, so this cannot happen.
            Err(RecvTimeoutError::Disconnected) => Wait::ShutdownRequested,
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTrigger {
    pub fn request(&self) {
        let _ = self.tx.send(());
    }
}
