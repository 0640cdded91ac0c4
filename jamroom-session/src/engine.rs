//! Block-synchronized audio mixing for one room.
//!
//! ```text
//! buffer_and_process(id, samples)
//!       │
//!       ▼
//! PerformerChannel[id].append()
//!       │
//!       ▼
//! is_ready()? ── no ──► None (samples wait for the slowest performer)
//!       │ yes
//!       ▼
//! take(block_size) from every channel
//!       │
//!       ▼
//! ProcessingGraph, one render quantum at a time
//!       │
//!       ▼
//! SessionArchive::append() ──► Some(mixed block)
//! ```
//!
//! The engine is driven from a single room worker, so `&mut self` on
//! `mix_cycle` is the whole non-reentrancy story: membership changes and
//! buffering queue behind an in-flight cycle.

use uuid::Uuid;

use crate::archive::SessionArchive;
use crate::channel::PerformerChannel;
use crate::error::SessionError;
use crate::graph::{MixBus, ProcessingGraph, DEFAULT_RENDER_QUANTUM};

/// Mixer configuration shared by every room.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerConfig {
    /// Samples per mixed block
    pub block_size: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count of the stream
    pub channels: u16,
    /// Sub-block size the default graph renders at a time
    pub render_quantum: usize,
    /// Log a warning when a channel backlog exceeds this many blocks
    pub backlog_warn_blocks: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            block_size: 1024,
            sample_rate: 44100,
            channels: 1,
            render_quantum: DEFAULT_RENDER_QUANTUM,
            backlog_warn_blocks: 16,
        }
    }
}

impl MixerConfig {
    /// Check that the block can be drained in whole render quanta.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.block_size == 0 {
            return Err(SessionError::ConfigError("block size must be non-zero".into()));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(SessionError::ConfigError(
                "sample rate and channel count must be non-zero".into(),
            ));
        }
        check_quantum(self.block_size, self.render_quantum)
    }
}

fn check_quantum(block_size: usize, quantum: usize) -> Result<(), SessionError> {
    if quantum == 0 || block_size % quantum != 0 {
        return Err(SessionError::ConfigError(format!(
            "block size {block_size} is not a multiple of render quantum {quantum}"
        )));
    }
    Ok(())
}

/// One room's mixer: performer channels, processing graph and archive.
pub struct MixingEngine {
    config: MixerConfig,
    /// Channels in registration order
    channels: Vec<PerformerChannel>,
    graph: Box<dyn ProcessingGraph>,
    archive: SessionArchive,
}

impl MixingEngine {
    /// Create an engine with the bypass summing graph.
    pub fn new(config: MixerConfig) -> Result<Self, SessionError> {
        let graph = Box::new(MixBus::bypass(config.render_quantum));
        Self::with_graph(config, graph)
    }

    /// Create an engine with a custom processing graph.
    pub fn with_graph(
        config: MixerConfig,
        graph: Box<dyn ProcessingGraph>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        check_quantum(config.block_size, graph.render_quantum())?;
        Ok(Self {
            config,
            channels: Vec::new(),
            graph,
            archive: SessionArchive::new(),
        })
    }

    /// Register an empty channel for a performer.
    pub fn add_performer(&mut self, id: Uuid) -> Result<(), SessionError> {
        if self.position(&id).is_some() {
            return Err(SessionError::DuplicateChannel(id));
        }
        self.channels.push(PerformerChannel::new(id));
        log::debug!(
            "Added performer {id} to mixer, now {} performers",
            self.channels.len()
        );
        Ok(())
    }

    /// Drop a performer's channel along with anything still buffered.
    pub fn remove_performer(&mut self, id: Uuid) -> Result<(), SessionError> {
        let pos = self.position(&id).ok_or(SessionError::UnknownChannel(id))?;
        let channel = self.channels.remove(pos);
        log::debug!(
            "Removed performer {id} from mixer ({} samples discarded), now {} performers",
            channel.len(),
            self.channels.len()
        );
        Ok(())
    }

    /// Buffer a performer's samples, then attempt one mix cycle.
    pub fn buffer_and_process(
        &mut self,
        id: Uuid,
        samples: &[f32],
    ) -> Result<Option<Vec<f32>>, SessionError> {
        let pos = self.position(&id).ok_or(SessionError::UnknownChannel(id))?;
        let threshold = self.config.block_size * self.config.backlog_warn_blocks;
        let channel = &mut self.channels[pos];
        let before = channel.len();
        channel.append(samples);
        if threshold > 0 && before <= threshold && channel.len() > threshold {
            log::warn!(
                "Performer {id} backlog is {} samples; waiting on slower performers",
                channel.len()
            );
        }
        self.mix_cycle()
    }

    /// True when every channel holds at least one block.
    pub fn is_ready(&self) -> bool {
        !self.channels.is_empty()
            && self
                .channels
                .iter()
                .all(|c| c.len() >= self.config.block_size)
    }

    /// Mix one block if every performer has one buffered.
    ///
    /// Returns `None` without touching any channel when not ready.
    pub fn mix_cycle(&mut self) -> Result<Option<Vec<f32>>, SessionError> {
        if !self.is_ready() {
            return Ok(None);
        }

        let block_size = self.config.block_size;
        let raw = self
            .channels
            .iter_mut()
            .map(|c| c.take(block_size))
            .collect::<Result<Vec<_>, _>>()?;

        let quantum = self.graph.render_quantum();
        let mut mixed = vec![0.0f32; block_size];
        for offset in (0..block_size).step_by(quantum) {
            let sources: Vec<&[f32]> = raw.iter().map(|b| &b[offset..offset + quantum]).collect();
            self.graph.render(&sources, &mut mixed[offset..offset + quantum]);
        }

        self.archive.append(&mixed);
        log::trace!(
            "Mixed block {} from {} performers",
            self.archive.blocks(),
            raw.len()
        );
        Ok(Some(mixed))
    }

    pub fn num_performers(&self) -> usize {
        self.channels.len()
    }

    pub fn has_performer(&self, id: &Uuid) -> bool {
        self.position(id).is_some()
    }

    /// Buffered sample count for a performer.
    pub fn channel_len(&self, id: &Uuid) -> Option<usize> {
        self.position(id).map(|pos| self.channels[pos].len())
    }

    pub fn performer_ids(&self) -> Vec<Uuid> {
        self.channels.iter().map(|c| c.id()).collect()
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn archive(&self) -> &SessionArchive {
        &self.archive
    }

    /// Hand out the session archive, leaving an empty one behind.
    pub fn take_archive(&mut self) -> SessionArchive {
        std::mem::take(&mut self.archive)
    }

    fn position(&self, id: &Uuid) -> Option<usize> {
        self.channels.iter().position(|c| c.id() == *id)
    }
}
