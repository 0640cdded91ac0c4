//! Per-performer FIFO sample buffer.
//!
//! Samples are appended at the tail and drained from the head in whole
//! blocks. Backed by a `VecDeque` so draining a block never shifts the
//! remaining backlog.

use std::collections::VecDeque;
use uuid::Uuid;

use crate::error::SessionError;

/// Buffered raw audio for one performer.
#[derive(Debug, Clone)]
pub struct PerformerChannel {
    id: Uuid,
    queue: VecDeque<f32>,
}

impl PerformerChannel {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            queue: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Append samples to the tail. Unbounded.
    pub fn append(&mut self, samples: &[f32]) {
        self.queue.extend(samples.iter().copied());
    }

    /// Remove and return the `n` oldest samples.
    ///
    /// Fails without touching the buffer if fewer than `n` are available;
    /// callers are expected to check readiness first.
    pub fn take(&mut self, n: usize) -> Result<Vec<f32>, SessionError> {
        if self.queue.len() < n {
            return Err(SessionError::Underflow {
                requested: n,
                available: self.queue.len(),
            });
        }
        Ok(self.queue.drain(..n).collect())
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
