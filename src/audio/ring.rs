use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Observer as _, RingBuffer as _};
use std::sync::{Mutex, MutexGuard};

pub type StereoFrame = [f32; 2];

// Capture callbacks and the render loop only ever hold the lock for a copy.
pub struct SampleRing {
    inner: Mutex<HeapRb<StereoFrame>>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(HeapRb::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write(&self, left: f32, right: f32) {
        self.lock().push_overwrite([left, right]);
    }

    pub fn extend<I>(&self, frames: I)
    where
        I: IntoIterator<Item = StereoFrame>,
    {
        let mut rb = self.lock();
        for f in frames {
            rb.push_overwrite(f);
        }
    }

    /// Appends interleaved samples; mono input feeds both channels and
    /// channels past the second are ignored.
    pub fn write_interleaved(&self, samples: &[f32], channels: usize) {
        let channels = channels.max(1);
        self.extend(samples.chunks_exact(channels).map(|frame| {
            let l = frame[0];
            [l, frame.get(1).copied().unwrap_or(l)]
        }));
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Most recent `count` frames, oldest first. The result always holds
    /// `count.min(capacity)` frames; missing history is zero-filled at the front.
    pub fn snapshot(&self, count: usize) -> (Vec<f32>, Vec<f32>) {
        let n = count.min(self.capacity);
        let mut left = vec![0.0f32; n];
        let mut right = vec![0.0f32; n];
        self.snapshot_into(&mut left, &mut right);
        (left, right)
    }

    pub fn snapshot_into(&self, left: &mut [f32], right: &mut [f32]) {
        let n = left.len().min(right.len());
        let rb = self.lock();
        let stored = rb.occupied_len();
        let take = n.min(stored);
        let pad = n - take;
        left[..pad].fill(0.0);
        right[..pad].fill(0.0);
        for (i, f) in rb.iter().skip(stored - take).enumerate() {
            left[pad + i] = f[0];
            right[pad + i] = f[1];
        }
    }

    /// 8-bit unsigned copies of the latest frames, centered at 128, for
    /// surfaces that only accept byte waveforms.
    pub fn latest_audio_bytes(&self, count: usize) -> AudioBytes {
        let (left, right) = self.snapshot(count);
        let mono = left
            .iter()
            .zip(&right)
            .map(|(l, r)| to_u8((l + r) * 0.5))
            .collect();
        AudioBytes {
            mono,
            left: left.iter().copied().map(to_u8).collect(),
            right: right.iter().copied().map(to_u8).collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeapRb<StereoFrame>> {
        // A panicked writer leaves plain sample data behind; keep using it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBytes {
    pub mono: Vec<u8>,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

fn to_u8(s: f32) -> u8 {
    let v = (s.clamp(-1.0, 1.0) * 128.0 + 128.0).round();
    v.clamp(0.0, 255.0) as u8
}
