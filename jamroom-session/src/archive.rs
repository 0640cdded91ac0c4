//! Append-only record of every mixed block in a room's lifetime.
//!
//! Export produces a fresh 16-bit PCM sequence and never touches the
//! stored samples, so it can be called any number of times.

/// Largest positive 16-bit sample magnitude.
pub const PCM16_SCALE: f32 = i16::MAX as f32;

/// Mixed session audio, in normalized `f32` samples.
#[derive(Debug, Clone, Default)]
pub struct SessionArchive {
    samples: Vec<f32>,
    blocks: usize,
}

impl SessionArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one mixed block.
    pub fn append(&mut self, block: &[f32]) {
        self.samples.extend_from_slice(block);
        self.blocks += 1;
    }

    /// Convert to 16-bit PCM.
    ///
    /// Samples are clamped to [-1, 1] before scaling so an overdriven mix
    /// saturates instead of wrapping.
    pub fn export(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * PCM16_SCALE).round() as i16)
            .collect()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of blocks appended so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Playback length of the archived audio.
    pub fn duration_secs(&self, sample_rate: u32, channels: u16) -> f64 {
        if sample_rate == 0 || channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (sample_rate as f64 * channels as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_grows() {
        let mut archive = SessionArchive::new();
        archive.append(&[0.0; 4]);
        archive.append(&[0.5; 4]);
        assert_eq!(archive.len(), 8);
        assert_eq!(archive.blocks(), 2);
        assert_eq!(&archive.samples()[4..], &[0.5; 4]);
    }

    #[test]
    fn test_export_scaling() {
        let mut archive = SessionArchive::new();
        archive.append(&[0.0, 1.0, -1.0, 0.5]);
        assert_eq!(archive.export(), vec![0, 32767, -32767, 16384]);
    }

    #[test]
    fn test_export_is_idempotent() {
        let mut archive = SessionArchive::new();
        archive.append(&[0.25; 16]);
        archive.append(&[-0.75; 16]);

        let first = archive.export();
        let second = archive.export();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
        // Stored samples untouched
        assert_eq!(archive.samples()[0], 0.25);
    }

    #[test]
    fn test_export_saturates_out_of_range() {
        let mut archive = SessionArchive::new();
        archive.append(&[2.0, -3.5]);
        assert_eq!(archive.export(), vec![32767, -32767]);
    }

    #[test]
    fn test_duration() {
        let mut archive = SessionArchive::new();
        archive.append(&vec![0.0; 44100]);
        assert!((archive.duration_secs(44100, 1) - 1.0).abs() < 1e-9);
        assert!((archive.duration_secs(44100, 2) - 0.5).abs() < 1e-9);
        assert_eq!(archive.duration_secs(0, 1), 0.0);
    }
}
