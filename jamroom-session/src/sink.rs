//! Hand-off point for finished sessions.
//!
//! Storing the recording (container format, upload, database rows) belongs
//! to an external collaborator. The coordinator only builds a
//! [`SessionArtifact`] and passes it to whichever [`CompositionSink`] it was
//! given.

use std::sync::Mutex;

use crate::error::SessionError;
use crate::protocol::CompositionMetadata;

/// A finished session: 16-bit PCM plus composition metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionArtifact {
    pub room_id: String,
    pub metadata: CompositionMetadata,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub pcm: Vec<i16>,
}

/// Persistence collaborator.
pub trait CompositionSink: Send + Sync {
    fn store(&self, artifact: SessionArtifact) -> Result<(), SessionError>;
}

/// Keeps artifacts in memory. Used by tests and embedders.
#[derive(Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<SessionArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything stored so far.
    pub fn artifacts(&self) -> Vec<SessionArtifact> {
        self.artifacts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl CompositionSink for MemorySink {
    fn store(&self, artifact: SessionArtifact) -> Result<(), SessionError> {
        self.artifacts
            .lock()
            .map_err(|e| SessionError::Persistence(e.to_string()))?
            .push(artifact);
        Ok(())
    }
}

/// Logs a summary and discards the audio.
pub struct LogSink;

impl CompositionSink for LogSink {
    fn store(&self, artifact: SessionArtifact) -> Result<(), SessionError> {
        log::info!(
            "Session {} ended: \"{}\" [{}] {:.1}s, {} samples at {} Hz",
            artifact.room_id,
            artifact.metadata.title,
            artifact.metadata.tags.join(", "),
            artifact.duration_secs,
            artifact.pcm.len(),
            artifact.sample_rate
        );
        Ok(())
    }
}
