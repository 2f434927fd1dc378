use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::Publisher;

#[derive(Debug, Default)]
struct TopicState {
    queue: VecDeque<String>,
    published: u64,
    dropped: u64,
    close_calls: u64,
    closed: bool,
}

/// In-process publisher with a bounded keep-last queue.
///
/// When the queue is full the oldest message is discarded. A `MemoryTopic`
/// handle observes the same queue from outside the node.
pub struct MemoryPublisher {
    topic: String,
    depth: usize,
    state: Arc<Mutex<TopicState>>,
}

/// Observer handle for a `MemoryPublisher`.
#[derive(Clone)]
pub struct MemoryTopic {
    state: Arc<Mutex<TopicState>>,
}

impl MemoryPublisher {
    pub fn new(topic: impl Into<String>, depth: usize) -> Self {
        Self {
            topic: topic.into(),
            depth: depth.max(1),
            state: Arc::new(Mutex::new(TopicState::default())),
        }
    }

    pub fn handle(&self) -> MemoryTopic {
        MemoryTopic {
            state: self.state.clone(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TopicState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory topic lock poisoned"))
    }
}

impl Publisher for MemoryPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, payload: &str) -> Result<()> {
        let depth = self.depth;
        let mut state = self.lock()?;
        if state.closed {
            return Err(anyhow!("publisher for '{}' is closed", self.topic));
        }
        if state.queue.len() >= depth {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(payload.to_string());
        state.published += 1;
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.close_calls += 1;
            state.closed = true;
        }
    }
}

impl MemoryTopic {
    fn with_state<T>(&self, f: impl FnOnce(&TopicState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Messages currently held in the queue, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.with_state(|state| state.queue.iter().cloned().collect())
    }

    /// Total publish calls accepted.
    pub fn published(&self) -> u64 {
        self.with_state(|state| state.published)
    }

    /// Messages evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.with_state(|state| state.dropped)
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|state| state.closed)
    }

    /// Number of times `close` was invoked on the publisher.
    pub fn close_calls(&self) -> u64 {
        self.with_state(|state| state.close_calls)
    }
}
