use serde::{Deserialize, Serialize};

use crate::{Result, TempoOrbitError};

/// Decoded audio: one sample vector per channel plus the sample rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PcmBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    /// Splits interleaved frames into per-channel vectors. Trailing samples
    /// that do not form a complete frame are dropped.
    pub fn from_interleaved(interleaved: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        if channel_count == 0 {
            return Self::new(Vec::new(), sample_rate);
        }

        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(channels, sample_rate)
    }

    pub fn first_channel(&self) -> Option<&[f32]> {
        self.channels.first().map(Vec::as_slice)
    }

    /// Number of frames in the shortest channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Averages all channels into one signal.
    pub fn downmix(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            count => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / count as f32)
                .collect(),
        }
    }
}

/// Decoding step that turns some external media into PCM data.
pub trait PcmSource {
    fn decode(&mut self) -> Result<PcmBuffer>;
}

impl<F> PcmSource for F
where
    F: FnMut() -> Result<PcmBuffer>,
{
    fn decode(&mut self) -> Result<PcmBuffer> {
        self()
    }
}

/// Upstream node of the rotation engine's signal graph. The engine takes
/// exclusive ownership on construction and disconnects it when destroyed.
pub trait SourceNode: Send {
    /// Fills `out` with the next samples and returns how many were written.
    /// Returning fewer than `out.len()` signals the end of the stream.
    fn read(&mut self, out: &mut [f32]) -> usize;

    fn disconnect(&mut self);
}

/// Source node that plays back a decoded buffer, downmixed to mono.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Vec<f32>,
    sample_rate: u32,
    position: usize,
    connected: bool,
}

impl BufferSource {
    pub fn new(pcm: &PcmBuffer) -> Result<Self> {
        if pcm.sample_rate == 0 {
            return Err(TempoOrbitError::InvalidInput(
                "buffer source requires a non-zero sample rate",
            ));
        }

        Ok(Self {
            samples: pcm.downmix(),
            sample_rate: pcm.sample_rate,
            position: 0,
            connected: true,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.samples.len()
    }
}

impl SourceNode for BufferSource {
    fn read(&mut self, out: &mut [f32]) -> usize {
        if !self.connected {
            return 0;
        }

        let remaining = &self.samples[self.position.min(self.samples.len())..];
        let count = remaining.len().min(out.len());
        out[..count].copy_from_slice(&remaining[..count]);
        self.position += count;
        count
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_frames() {
        let pcm = PcmBuffer::from_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0], 2, 8_000);

        assert_eq!(pcm.channels, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
        assert_eq!(pcm.first_channel(), Some(&[1.0, 2.0][..]));
        assert_eq!(pcm.frames(), 2);
    }

    #[test]
    fn downmix_averages_channels() {
        let pcm = PcmBuffer::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 10);
        assert_eq!(pcm.downmix(), vec![0.5, 0.5]);
        assert!((pcm.duration_seconds() - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn closures_act_as_pcm_sources() {
        let mut source = || -> Result<PcmBuffer> { Ok(PcmBuffer::mono(vec![0.0; 4], 4)) };
        let pcm = source.decode().unwrap();
        assert_eq!(pcm.frames(), 4);
    }

    #[test]
    fn buffer_source_streams_until_exhausted() {
        let mut source = BufferSource::new(&PcmBuffer::mono(vec![1.0, 2.0, 3.0], 3)).unwrap();
        let mut block = [0.0; 2];

        assert_eq!(source.read(&mut block), 2);
        assert_eq!(block, [1.0, 2.0]);
        assert_eq!(source.read(&mut block), 1);
        assert_eq!(block[0], 3.0);
        assert!(source.is_finished());
        assert_eq!(source.read(&mut block), 0);
    }

    #[test]
    fn disconnected_source_stays_silent() {
        let mut source = BufferSource::new(&PcmBuffer::mono(vec![1.0; 8], 8)).unwrap();
        source.disconnect();

        let mut block = [0.0; 4];
        assert_eq!(source.read(&mut block), 0);
        assert!(!source.is_connected());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(BufferSource::new(&PcmBuffer::mono(vec![0.0], 0)).is_err());
    }
}
