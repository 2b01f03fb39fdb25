//! Sample vectors and multi-channel buffers.
//!
//! A [`Signal`] is one vector of samples (one block of one channel). A
//! [`Buffer`] bundles one `Signal` per inlet or outlet of a processor. Both are
//! sized once at chain compilation and reused every block, so the audio path
//! never allocates.

/// The sample type used throughout the chain.
pub type Sample = f32;

/// One block of samples for a single channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    samples: Vec<Sample>,
}

impl Signal {
    /// Creates a zeroed signal of `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    /// Creates a signal filled with `value`.
    pub fn filled(len: usize, value: Sample) -> Self {
        Self {
            samples: vec![value; len],
        }
    }

    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the signal holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the sample at `index`, or silence when out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Sample {
        self.samples.get(index).copied().unwrap_or(0.0)
    }

    /// Fills every sample with `value`.
    pub fn fill(&mut self, value: Sample) {
        self.samples.fill(value);
    }

    /// Sets every sample to zero.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Resizes to `len` samples, zeroing new samples.
    pub fn resize(&mut self, len: usize) {
        self.samples.resize(len, 0.0);
    }

    /// Copies samples from `other`. Extra samples on either side are left untouched.
    pub fn copy_from(&mut self, other: &Signal) {
        let n = self.len().min(other.len());
        self.samples[..n].copy_from_slice(&other.samples[..n]);
    }

    /// Adds `other` into this signal sample by sample.
    pub fn accumulate_from(&mut self, other: &Signal) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Returns the samples as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Returns the samples as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }
}

impl From<Vec<Sample>> for Signal {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

/// A set of equally sized signals, one per port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    channels: Vec<Signal>,
    vector_size: usize,
}

impl Buffer {
    /// Creates a zeroed buffer of `channels` signals of `vector_size` samples.
    pub fn new(channels: usize, vector_size: usize) -> Self {
        Self {
            channels: (0..channels).map(|_| Signal::new(vector_size)).collect(),
            vector_size,
        }
    }

    /// Returns the number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of samples per channel.
    #[inline]
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Returns the channel at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &Signal {
        &self.channels[index]
    }

    /// Returns the channel at `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut Signal {
        &mut self.channels[index]
    }

    /// Returns the channel at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Signal> {
        self.channels.get(index)
    }

    /// Iterates over the channels.
    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.channels.iter()
    }

    /// Iterates mutably over the channels.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Signal> {
        self.channels.iter_mut()
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
    }

    /// Reshapes the buffer, zeroing any new samples.
    pub fn resize(&mut self, channels: usize, vector_size: usize) {
        self.channels.resize_with(channels, || Signal::new(vector_size));
        for channel in &mut self.channels {
            channel.resize(vector_size);
        }
        self.vector_size = vector_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_out_of_range_is_silence() {
        let s = Signal::filled(4, 0.5);
        assert_eq!(s.get(3), 0.5);
        assert_eq!(s.get(4), 0.0);
    }

    #[test]
    fn accumulate_sums_samplewise() {
        let mut a = Signal::filled(3, 1.0);
        let b = Signal::from(vec![0.5, -1.0, 2.0]);
        a.accumulate_from(&b);
        assert_eq!(a.as_slice(), &[1.5, 0.0, 3.0]);
    }

    #[test]
    fn copy_from_shorter_signal_keeps_tail() {
        let mut a = Signal::filled(4, 9.0);
        a.copy_from(&Signal::from(vec![1.0, 2.0]));
        assert_eq!(a.as_slice(), &[1.0, 2.0, 9.0, 9.0]);
    }

    #[test]
    fn buffer_resize_reshapes_all_channels() {
        let mut b = Buffer::new(1, 8);
        b.channel_mut(0).fill(1.0);
        b.resize(3, 16);
        assert_eq!(b.channel_count(), 3);
        assert_eq!(b.vector_size(), 16);
        assert!(b.iter().all(|c| c.len() == 16));
        assert_eq!(b.channel(0).get(7), 1.0);
        assert_eq!(b.channel(0).get(8), 0.0);
    }

    #[test]
    fn buffer_clear_zeroes() {
        let mut b = Buffer::new(2, 4);
        b.channel_mut(1).fill(3.0);
        b.clear();
        assert!(b.iter().all(|c| c.as_slice().iter().all(|&s| s == 0.0)));
    }
}
