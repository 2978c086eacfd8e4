//! Min/max column envelopes over decoded sample data.
//!
//! Both the full and the partial render path read columns out of one
//! full-zoomed-width envelope, so pixels shared between the two paths are
//! identical by construction. Envelopes are cached per decode generation and
//! zoomed width behind a small LRU.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::decoder::DecodedAudio;

/// Build `(min, max)` extrema per column for one channel plane.
///
/// Columns past the end of very short sources replicate the nearest frame so
/// sparse audio still spans the full width.
pub fn sample_channel_columns(samples: &[f32], width: usize) -> Vec<(f32, f32)> {
    let width = width.max(1);
    let frame_count = samples.len();
    if frame_count == 0 {
        return vec![(0.0, 0.0); width];
    }
    let total = frame_count as f64;
    let mut columns = vec![(0.0, 0.0); width];
    for (x, col) in columns.iter_mut().enumerate() {
        let start = ((x as f64 * total) / width as f64)
            .floor()
            .min(frame_count.saturating_sub(1) as f64) as usize;
        let mut end = (((x as f64 + 1.0) * total) / width as f64)
            .ceil()
            .max((start + 1) as f64)
            .min(frame_count as f64) as usize;
        if end <= start {
            end = (start + 1).min(frame_count);
        }
        let mut min = 1.0_f32;
        let mut max = -1.0_f32;
        for &sample in &samples[start..end] {
            let clamped = sample.clamp(-1.0, 1.0);
            min = min.min(clamped);
            max = max.max(clamped);
        }
        *col = (min, max);
    }
    columns
}

/// One channel's full-width envelope.
pub type ColumnEnvelope = Arc<[(f32, f32)]>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct EnvelopeKey {
    /// Bumped whenever the attached audio changes; prevents stale hits when a
    /// new decode reuses the same dimensions.
    token: u64,
    channel: usize,
    width: usize,
}

/// LRU of computed envelopes, keyed by decode generation, channel, and zoomed
/// width. Scrolling never invalidates an entry; zoom changes miss and insert.
pub struct EnvelopeCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    map: HashMap<EnvelopeKey, ColumnEnvelope>,
    order: VecDeque<EnvelopeKey>,
    max_entries: usize,
}

impl EnvelopeCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                max_entries: 8,
            }),
        }
    }

    pub fn get_or_compute(
        &self,
        token: u64,
        audio: &DecodedAudio,
        channel: usize,
        width: usize,
    ) -> ColumnEnvelope {
        let key = EnvelopeKey {
            token,
            channel,
            width,
        };
        {
            let mut inner = self.inner.lock().expect("envelope cache lock");
            if let Some(hit) = inner.map.get(&key).cloned() {
                inner.touch(key);
                return hit;
            }
        }

        let samples = audio.slice_channel(channel, 0, audio.data_length());
        let computed: ColumnEnvelope = sample_channel_columns(&samples, width).into();

        let mut inner = self.inner.lock().expect("envelope cache lock");
        if let Some(hit) = inner.map.get(&key).cloned() {
            inner.touch(key);
            return hit;
        }
        inner.insert(key, Arc::clone(&computed));
        computed
    }
}

impl CacheInner {
    fn touch(&mut self, key: EnvelopeKey) {
        self.order.retain(|existing| existing != &key);
        self.order.push_back(key);
    }

    fn insert(&mut self, key: EnvelopeKey, value: ColumnEnvelope) {
        self.map.insert(key, value);
        self.touch(key);
        while self.map.len() > self.max_entries {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_with(samples: Vec<f32>) -> DecodedAudio {
        DecodedAudio {
            chunks: vec![vec![Arc::from(samples.as_slice())]],
            sample_rate: 8,
            channel_count: 1,
            duration: samples.len() as f64 / 8.0,
        }
    }

    #[test]
    fn columns_capture_extrema_per_bucket() {
        let columns = sample_channel_columns(&[0.1, 0.2, 0.3, 0.4], 2);
        assert_eq!(columns, vec![(0.1, 0.2), (0.3, 0.4)]);
    }

    #[test]
    fn columns_clamp_out_of_range_samples() {
        let columns = sample_channel_columns(&[2.0, -3.0], 1);
        assert_eq!(columns, vec![(-1.0, 1.0)]);
    }

    #[test]
    fn empty_input_yields_flat_envelope() {
        assert_eq!(sample_channel_columns(&[], 3), vec![(0.0, 0.0); 3]);
    }

    #[test]
    fn sparse_audio_replicates_across_columns() {
        let columns = sample_channel_columns(&[0.75], 4);
        assert_eq!(columns, vec![(0.75, 0.75); 4]);
    }

    #[test]
    fn tail_samples_are_not_dropped() {
        let columns = sample_channel_columns(&[0.1, 0.1, 0.1, 0.1, 0.9], 2);
        assert!((columns[1].1 - 0.9).abs() < 1e-6);
    }

    #[test]
    fn cache_hits_return_shared_envelope() {
        let cache = EnvelopeCache::new();
        let audio = audio_with(vec![0.0, 0.5, -0.5, 1.0]);
        let first = cache.get_or_compute(1, &audio, 0, 16);
        let second = cache.get_or_compute(1, &audio, 0, 16);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn token_change_avoids_stale_envelopes() {
        let cache = EnvelopeCache::new();
        let quiet = audio_with(vec![0.0, 0.0]);
        let loud = audio_with(vec![1.0, 1.0]);
        let before = cache.get_or_compute(1, &quiet, 0, 1);
        let after = cache.get_or_compute(2, &loud, 0, 1);
        assert_ne!(before[0], after[0]);
    }

    #[test]
    fn eviction_keeps_cache_bounded() {
        let cache = EnvelopeCache::new();
        let audio = audio_with(vec![0.25; 8]);
        for width in 1..=20usize {
            cache.get_or_compute(1, &audio, 0, width);
        }
        let inner = cache.inner.lock().unwrap();
        assert!(inner.map.len() <= inner.max_entries);
        assert_eq!(inner.map.len(), inner.order.len());
    }
}
