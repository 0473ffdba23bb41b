use std::time::Duration;

/// Fixed-capacity sample buffer filled by a device callback.
///
/// Sized once for the whole clip (`duration * rate * channels`). Writes past
/// capacity are dropped, so a device that over-delivers cannot grow the
/// allocation. Share as `Arc<parking_lot::Mutex<SampleBuffer>>`.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Buffer sized for `duration` of interleaved audio.
    pub fn for_duration(duration: Duration, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        Self::new(frames * channels as usize)
    }

    /// Append as many samples as fit. Returns how many were accepted.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let accepted = samples.len().min(self.remaining());
        self.samples.extend_from_slice(&samples[..accepted]);
        accepted
    }

    /// Append integer samples, scaling to `[-1.0, 1.0]`.
    pub fn push_i16(&mut self, samples: &[i16]) -> usize {
        let accepted = samples.len().min(self.remaining());
        self.samples
            .extend(samples[..accepted].iter().map(|&s| s as f32 / i16::MAX as f32));
        accepted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the samples, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_for_duration() {
        let buf = SampleBuffer::for_duration(Duration::from_secs(20), 48000, 1);
        assert_eq!(buf.capacity(), 960_000);

        let buf = SampleBuffer::for_duration(Duration::from_millis(500), 44100, 2);
        assert_eq!(buf.capacity(), 44100);
    }

    #[test]
    fn fills_then_drops_overflow() {
        let mut buf = SampleBuffer::new(4);
        assert_eq!(buf.push(&[1.0, 2.0, 3.0]), 3);
        assert!(!buf.is_full());
        assert_eq!(buf.push(&[4.0, 5.0, 6.0]), 1);
        assert!(buf.is_full());
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.take(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn push_i16_scales() {
        let mut buf = SampleBuffer::new(3);
        buf.push_i16(&[i16::MAX, 0, -i16::MAX]);
        assert_eq!(buf.take(), vec![1.0, 0.0, -1.0]);
    }
}
