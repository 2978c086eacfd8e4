//! Chunked audio decoding: bytes in, ordered per-channel sample chunks out.
//!
//! Decoding is cooperative: the owner drives a stepper that produces one
//! bounded-duration slice at a time and checks a cancellation flag before each
//! resume, so a large file never monopolizes the caller's thread.

mod backend;
mod splitter;
mod stepper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use crate::events::DestroyFlag;

pub use backend::DecoderBackendKind;
pub use splitter::{SplitterGuard, acquire_splitter};
pub(crate) use stepper::SliceStepper;

/// Seconds of audio per decoded chunk window.
pub const CHUNK_WINDOW_SECS: u32 = 30 * 60;

/// Negative offset applied to the first requested slice.
///
/// The slicing backend under-reports duration by up to a second at slice
/// boundaries; shortening the first slice keeps subsequent slices aligned.
/// Empirically required, do not remove.
pub const FIRST_SLICE_BACKOFF_SECS: u32 = 1;

/// Errors raised while decoding audio bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The byte container could not be recognized or parsed.
    #[error("Invalid audio data: {message}")]
    Invalid { message: String },
    /// A sample failed to decode mid-stream.
    #[error("Sample error: {source}")]
    Sample { source: hound::Error },
    /// The symphonia backend reported a failure.
    #[error("Decode backend error: {message}")]
    Backend { message: String },
    /// Decoding was cancelled before completion.
    #[error("Decode cancelled")]
    Cancelled,
}

/// One decoded audio source, chunked per channel.
///
/// `chunks[channel]` is an increasing-time, gap-free list of fixed-window
/// sample blocks. Channel count and sample rate are fixed once decoding
/// starts.
#[derive(Clone)]
pub struct DecodedAudio {
    /// Per-channel chunk lists. With split decoding disabled there is a single
    /// channel holding the downmix.
    pub chunks: Vec<Vec<Arc<[f32]>>>,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count represented by `chunks`.
    pub channel_count: usize,
    /// Total duration in seconds.
    pub duration: f64,
}

impl DecodedAudio {
    /// Samples per channel across all chunks.
    pub fn data_length(&self) -> usize {
        self.chunks
            .first()
            .map(|chunks| chunks.iter().map(|chunk| chunk.len()).sum())
            .unwrap_or(0)
    }

    /// Copy the per-channel sample window `[start_frame, end_frame)` out of
    /// the chunk list.
    pub fn slice_channel(&self, channel: usize, start_frame: usize, end_frame: usize) -> Vec<f32> {
        let Some(chunks) = self.chunks.get(channel) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(end_frame.saturating_sub(start_frame));
        let mut offset = 0usize;
        for chunk in chunks {
            let chunk_end = offset + chunk.len();
            if chunk_end > start_frame && offset < end_frame {
                let from = start_frame.saturating_sub(offset);
                let to = (end_frame - offset).min(chunk.len());
                out.extend_from_slice(&chunk[from..to]);
            }
            offset = chunk_end;
            if offset >= end_frame {
                break;
            }
        }
        out
    }

    /// Interleave every channel back into one buffer, used by the buffer
    /// playback backend.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.data_length();
        let channels = self.channel_count.max(1);
        let mut out = vec![0.0_f32; frames * channels];
        for channel in 0..channels {
            let data = self.slice_channel(channel.min(self.chunks.len().saturating_sub(1)), 0, frames);
            for (frame, &sample) in data.iter().enumerate() {
                out[frame * channels + channel] = sample;
            }
        }
        out
    }
}

/// Options accepted by [`AudioDecoder::decode`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// Produce one chunk list per source channel instead of a mono downmix.
    pub multi_channel: bool,
    /// Force a specific backend rather than sniffing the container.
    pub backend: Option<DecoderBackendKind>,
}

/// Result shared between every caller of an in-flight decode.
struct DecodeTask {
    state: Mutex<TaskState>,
    done: Condvar,
}

enum TaskState {
    Running,
    Finished(Result<Arc<DecodedAudio>, Arc<DecodeError>>),
}

impl DecodeTask {
    fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Running),
            done: Condvar::new(),
        }
    }

    fn finish(&self, result: Result<Arc<DecodedAudio>, DecodeError>) {
        let mut state = self.state.lock().expect("decode task lock");
        *state = TaskState::Finished(result.map_err(Arc::new));
        self.done.notify_all();
    }

    fn wait(&self) -> Result<Arc<DecodedAudio>, DecodeError> {
        let mut state = self.state.lock().expect("decode task lock");
        loop {
            match &*state {
                TaskState::Running => {
                    state = self.done.wait(state).expect("decode task wait");
                }
                TaskState::Finished(result) => {
                    return result.clone().map_err(|err| reclone_error(&err));
                }
            }
        }
    }
}

/// Rebuild an owned error from the shared task result.
fn reclone_error(err: &DecodeError) -> DecodeError {
    match err {
        DecodeError::Invalid { message } => DecodeError::Invalid {
            message: message.clone(),
        },
        DecodeError::Sample { source } => DecodeError::Backend {
            message: source.to_string(),
        },
        DecodeError::Backend { message } => DecodeError::Backend {
            message: message.clone(),
        },
        DecodeError::Cancelled => DecodeError::Cancelled,
    }
}

struct DecoderInner {
    bytes: Option<Arc<[u8]>>,
    decoded: Option<Arc<DecodedAudio>>,
    in_flight: Option<Arc<DecodeTask>>,
}

/// Cancellable, reusable audio decoder with a shared in-flight decode.
pub struct AudioDecoder {
    inner: Mutex<DecoderInner>,
    cancelled: Arc<AtomicBool>,
    destroyed: DestroyFlag,
}

impl AudioDecoder {
    /// Create a decoder with no source attached.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DecoderInner {
                bytes: None,
                decoded: None,
                in_flight: None,
            }),
            cancelled: Arc::new(AtomicBool::new(false)),
            destroyed: DestroyFlag::new(),
        }
    }

    /// Attach source bytes. A second call while already initialized is a no-op.
    pub fn init(&self, bytes: Arc<[u8]>) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let mut inner = self.inner.lock().expect("decoder lock");
        if inner.bytes.is_some() {
            debug!("decoder already initialized, ignoring init");
            return;
        }
        inner.bytes = Some(bytes);
    }

    /// True once a decode has completed and its result is cached.
    pub fn source_decoded(&self) -> bool {
        self.inner
            .lock()
            .expect("decoder lock")
            .decoded
            .is_some()
    }

    /// Decode the attached bytes into chunked samples.
    ///
    /// Concurrent callers share one in-flight decode: calls made before
    /// completion all wait on the same task instead of starting another pass.
    /// The completed result is cached until [`AudioDecoder::reset`].
    pub fn decode(&self, options: DecodeOptions) -> Result<Arc<DecodedAudio>, DecodeError> {
        if self.destroyed.is_destroyed() {
            return Err(DecodeError::Cancelled);
        }
        let task = {
            let mut inner = self.inner.lock().expect("decoder lock");
            if let Some(decoded) = inner.decoded.as_ref() {
                return Ok(Arc::clone(decoded));
            }
            if let Some(task) = inner.in_flight.as_ref() {
                Arc::clone(task)
            } else {
                let bytes = inner.bytes.as_ref().cloned().ok_or_else(|| {
                    DecodeError::Invalid {
                        message: "decoder has no source bytes".to_string(),
                    }
                })?;
                let task = Arc::new(DecodeTask::new());
                inner.in_flight = Some(Arc::clone(&task));
                self.spawn_decode(bytes, options, Arc::clone(&task));
                task
            }
        };
        let result = task.wait();
        let mut inner = self.inner.lock().expect("decoder lock");
        if let Some(current) = inner.in_flight.as_ref() {
            if Arc::ptr_eq(current, &task) {
                inner.in_flight = None;
            }
        }
        if let Ok(decoded) = &result {
            inner.decoded = Some(Arc::clone(decoded));
        }
        result
    }

    fn spawn_decode(&self, bytes: Arc<[u8]>, options: DecodeOptions, task: Arc<DecodeTask>) {
        let cancelled = Arc::clone(&self.cancelled);
        let worker_task = Arc::clone(&task);
        let spawn_result = thread::Builder::new()
            .name("waveform-decode".to_string())
            .spawn(move || {
                let result = run_decode(&bytes, options, &cancelled);
                worker_task.finish(result);
            });
        if let Err(err) = spawn_result {
            warn!("decode thread failed to start: {err}");
            task.finish(Err(DecodeError::Backend {
                message: format!("decode thread failed to start: {err}"),
            }));
        }
    }

    /// Cooperatively cancel any in-flight decode.
    ///
    /// Idempotent: redundant cancels, including after decode completion, are
    /// harmless and leave the cached result untouched.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Clear cancellation so the same decoder can serve a retried load.
    pub fn renew(&self) {
        if self.destroyed.is_destroyed() {
            return;
        }
        self.cancelled.store(false, Ordering::Release);
    }

    /// True when `cancel` has been called since the last `renew`.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Drop cached bytes and decoded data so a new source can be attached.
    pub fn reset(&self) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let mut inner = self.inner.lock().expect("decoder lock");
        inner.bytes = None;
        inner.decoded = None;
    }

    /// Cancel and mark destroyed; all further calls become no-ops.
    pub fn destroy(&self) {
        if !self.destroyed.destroy() {
            return;
        }
        self.cancel();
    }
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn run_decode(
    bytes: &[u8],
    options: DecodeOptions,
    cancelled: &AtomicBool,
) -> Result<Arc<DecodedAudio>, DecodeError> {
    let mut stepper = SliceStepper::open(bytes, options.backend)?;
    let sample_rate = stepper.sample_rate();
    let source_channels = stepper.channels().max(1);
    let out_channels = if options.multi_channel {
        source_channels
    } else {
        1
    };

    let splitter = if options.multi_channel && source_channels > 1 {
        Some(acquire_splitter())
    } else {
        None
    };

    let mut chunks: Vec<Vec<Arc<[f32]>>> = vec![Vec::new(); out_channels];
    let mut total_frames = 0usize;
    let mut first = true;
    loop {
        if cancelled.load(Ordering::Acquire) {
            return Err(DecodeError::Cancelled);
        }
        let window_frames = slice_frames(sample_rate, first);
        first = false;
        let Some(interleaved) = stepper.next_slice(window_frames)? else {
            break;
        };
        let frames = interleaved.len() / source_channels;
        total_frames += frames;
        if let Some(splitter) = splitter.as_ref() {
            let planes = splitter.split(interleaved, source_channels);
            for (channel, plane) in planes.into_iter().enumerate().take(out_channels) {
                chunks[channel].push(Arc::from(plane));
            }
        } else {
            chunks[0].push(Arc::from(downmix(&interleaved, source_channels)));
        }
    }

    let duration = total_frames as f64 / sample_rate.max(1) as f64;
    debug!(
        "decoded {total_frames} frames across {} chunk(s), {out_channels} channel(s)",
        chunks.first().map(|c| c.len()).unwrap_or(0)
    );
    Ok(Arc::new(DecodedAudio {
        chunks,
        sample_rate,
        channel_count: out_channels,
        duration,
    }))
}

/// Frame budget for one decode slice; the first slice is a second shorter.
fn slice_frames(sample_rate: u32, first: bool) -> usize {
    let window = sample_rate as usize * CHUNK_WINDOW_SECS as usize;
    if first {
        window.saturating_sub(sample_rate as usize * FIRST_SLICE_BACKOFF_SECS as usize)
    } else {
        window
    }
    .max(1)
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::SampleFormat;

    pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create wav writer");
            for &sample in samples {
                writer.write_sample(sample).expect("write sample");
            }
            writer.finalize().expect("finalize wav");
        }
        cursor.into_inner()
    }

    #[test]
    fn decode_produces_ordered_gap_free_chunks() {
        let samples: Vec<i16> = (0..1000).map(|i| (i % 100) as i16 * 300).collect();
        let bytes = wav_bytes(1, 8_000, &samples);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(bytes));
        let decoded = decoder.decode(DecodeOptions::default()).expect("decode");

        assert_eq!(decoded.channel_count, 1);
        assert_eq!(decoded.sample_rate, 8_000);
        assert_eq!(decoded.data_length(), samples.len());
        let rebuilt = decoded.slice_channel(0, 0, decoded.data_length());
        for (i, sample) in rebuilt.iter().enumerate() {
            let expected = samples[i] as f32 / i16::MAX as f32;
            assert!((sample - expected).abs() < 1e-3, "sample {i} mismatched");
        }
    }

    #[test]
    fn multi_channel_decode_splits_planes() {
        // L ramps up, R stays negative, so the planes are distinguishable.
        let mut samples = Vec::new();
        for i in 0..200 {
            samples.push((i * 100) as i16);
            samples.push(-8_000_i16);
        }
        let bytes = wav_bytes(2, 8_000, &samples);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(bytes));
        let decoded = decoder
            .decode(DecodeOptions {
                multi_channel: true,
                backend: None,
            })
            .expect("decode");

        assert_eq!(decoded.channel_count, 2);
        assert_eq!(decoded.data_length(), 200);
        let right = decoded.slice_channel(1, 0, 200);
        assert!(right.iter().all(|s| *s < 0.0));
    }

    #[test]
    fn init_is_idempotent() {
        let first = wav_bytes(1, 8_000, &[100, 200, 300]);
        let second = wav_bytes(1, 8_000, &[0; 64]);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(first));
        decoder.init(Arc::from(second));
        let decoded = decoder.decode(DecodeOptions::default()).expect("decode");
        assert_eq!(decoded.data_length(), 3);
    }

    #[test]
    fn decode_result_is_cached() {
        let bytes = wav_bytes(1, 8_000, &[1, 2, 3, 4]);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(bytes));
        let first = decoder.decode(DecodeOptions::default()).expect("decode");
        let second = decoder.decode(DecodeOptions::default()).expect("decode");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(decoder.source_decoded());
    }

    #[test]
    fn cancel_is_idempotent_and_preserves_decoded_state() {
        let bytes = wav_bytes(1, 8_000, &[5; 32]);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(bytes));
        decoder.decode(DecodeOptions::default()).expect("decode");
        let before = decoder.source_decoded();

        decoder.cancel();
        decoder.cancel();

        assert_eq!(decoder.source_decoded(), before);
        assert!(decoder.is_cancelled());
        decoder.renew();
        assert!(!decoder.is_cancelled());
    }

    #[test]
    fn cancelled_decoder_rejects_new_decode_until_renewed() {
        let bytes = wav_bytes(1, 8_000, &[5; 32]);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(bytes));
        decoder.cancel();
        let err = decoder.decode(DecodeOptions::default());
        assert!(matches!(err, Err(DecodeError::Cancelled)));

        decoder.renew();
        assert!(decoder.decode(DecodeOptions::default()).is_ok());
    }

    #[test]
    fn invalid_bytes_report_invalid_error() {
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(vec![1u8, 2, 3, 4, 5]));
        let err = decoder.decode(DecodeOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn interleaved_round_trip_matches_planes() {
        let mut samples = Vec::new();
        for i in 0..16 {
            samples.push((i * 1000) as i16);
            samples.push(-(i * 1000) as i16);
        }
        let bytes = wav_bytes(2, 8_000, &samples);
        let decoder = AudioDecoder::new();
        decoder.init(Arc::from(bytes));
        let decoded = decoder
            .decode(DecodeOptions {
                multi_channel: true,
                backend: None,
            })
            .expect("decode");
        let interleaved = decoded.interleaved();
        assert_eq!(interleaved.len(), decoded.data_length() * 2);
        let left = decoded.slice_channel(0, 0, 4);
        assert_eq!(&interleaved[0..2], &[left[0], -left[0]]);
    }
}
