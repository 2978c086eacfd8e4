//! Media loading: resolve a source into a ready-to-play [`WaveformAudio`].
//!
//! Fetching and decoding run on a background worker so the caller's thread is
//! never held for the length of a download. The owner drives the in-flight
//! load with [`MediaLoader::poll`]; byte-level progress is emitted from the
//! worker as it reads. Bytes and decoded data are both cached so a later
//! element-level playback failure can be recovered without refetching or
//! redecoding.

use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{info, warn};

use crate::decoder::{AudioDecoder, DecodeError, DecodeOptions, DecodedAudio};
use crate::events::{DestroyFlag, EventHub, WaveformEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunk size for progress-reporting reads.
const PROGRESS_CHUNK: usize = 64 * 1024;

/// Upper bound on fetched media. Large enough for hours of lossless audio,
/// small enough to stop a runaway body from exhausting memory.
const MAX_MEDIA_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Query parameters whose presence marks a pre-signed URL. Those URLs must be
/// passed through untouched; adding a cache-buster would break the signature.
const SIGNATURE_PARAMS: &[&str] = &[
    "X-Amz-Signature",
    "X-Goog-Signature",
    "Signature",
    "sig",
    "token",
];

/// Shared HTTP agent with consistent timeouts.
fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build()
    })
}

/// Errors raised while resolving a source.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The server answered with a non-success status.
    #[error("Request for {url} failed with status {status}")]
    Http { status: u16, url: String },
    /// Transport-level failure (DNS, connect, abort).
    #[error("Network error: {message}")]
    Network { message: String },
    /// The response body exceeded the media size limit.
    #[error("Media too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    /// Reading the response body or a local file failed.
    #[error("Read failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    /// The source URL could not be parsed.
    #[error("Invalid source url: {source}")]
    Url {
        #[from]
        source: url::ParseError,
    },
    /// The decode pipeline rejected the fetched bytes.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Where the audio comes from.
#[derive(Clone, Debug)]
pub enum MediaSource {
    Url(String),
    File(PathBuf),
    Bytes(Arc<[u8]>),
}

/// One decoded, playback-ready source: the raw bytes feed the streaming
/// backend, the decoded chunks feed rendering and the buffer backend.
pub struct WaveformAudio {
    pub bytes: Arc<[u8]>,
    pub decoded: Arc<DecodedAudio>,
}

impl WaveformAudio {
    pub fn duration(&self) -> f64 {
        self.decoded.duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.decoded.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.decoded.channel_count
    }
}

/// Rewrite a source URL for fetching: pre-signed URLs pass through untouched,
/// everything else gets a cache-busting parameter so partial-content caches
/// cannot serve inconsistent ranges across requests.
pub fn prepare_url(raw: &str) -> Result<String, LoadError> {
    let mut parsed = url::Url::parse(raw)?;
    let presigned = parsed
        .query_pairs()
        .any(|(key, _)| SIGNATURE_PARAMS.iter().any(|name| key == *name));
    if presigned {
        return Ok(raw.to_string());
    }
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    parsed
        .query_pairs_mut()
        .append_pair("ts", &stamp.to_string());
    Ok(parsed.to_string())
}

pub struct MediaLoader {
    hub: Arc<EventHub<WaveformEvent>>,
    decoder: Arc<AudioDecoder>,
    options: DecodeOptions,
    audio: Option<WaveformAudio>,
    pending: Option<Receiver<Result<WaveformAudio, LoadError>>>,
    destroyed: DestroyFlag,
}

impl MediaLoader {
    pub fn new(
        hub: Arc<EventHub<WaveformEvent>>,
        decoder: Arc<AudioDecoder>,
        options: DecodeOptions,
    ) -> Self {
        Self {
            hub,
            decoder,
            options,
            audio: None,
            pending: None,
            destroyed: DestroyFlag::new(),
        }
    }

    pub fn audio(&self) -> Option<&WaveformAudio> {
        self.audio.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.audio.is_some()
    }

    /// True while a load has been kicked off but not yet settled by `poll`.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Kick off resolving the source on a background worker.
    ///
    /// Returns immediately; the owner observes completion through `poll` (or
    /// `wait`). Idempotent — a call while loaded or still in flight does
    /// nothing.
    pub fn load(&mut self, source: &MediaSource) {
        if self.destroyed.is_destroyed() || self.audio.is_some() || self.pending.is_some() {
            return;
        }
        let (sender, receiver) = channel();
        let hub = Arc::clone(&self.hub);
        let decoder = Arc::clone(&self.decoder);
        let options = self.options;
        let worker_source = source.clone();
        let spawned = thread::Builder::new()
            .name("media-load".to_string())
            .spawn(move || {
                let result = resolve(&hub, &decoder, options, &worker_source);
                // The loader may be reset or destroyed while resolving.
                let _ = sender.send(result);
            });
        match spawned {
            Ok(_) => self.pending = Some(receiver),
            Err(err) => {
                warn!("load thread failed to start, resolving inline: {err}");
                let (sender, receiver) = channel();
                let result = resolve(&self.hub, &self.decoder, self.options, source);
                let _ = sender.send(result);
                self.pending = Some(receiver);
            }
        }
    }

    /// Drive an in-flight load one step without blocking.
    ///
    /// Returns `Some` on the call that observes completion: the audio is
    /// cached and `DurationChanged` + `Load` are emitted on success, a single
    /// `Error` event on failure. Loading stops without retry.
    pub fn poll(&mut self) -> Option<Result<(), LoadError>> {
        if self.destroyed.is_destroyed() {
            self.pending = None;
            return None;
        }
        let result = match self.pending.as_ref()?.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(LoadError::Network {
                message: "load worker exited without a result".to_string(),
            }),
        };
        self.pending = None;
        Some(self.settle(result))
    }

    /// Block until the in-flight load settles, for callers without a
    /// scheduler. Returns `None` when nothing is in flight.
    pub fn wait(&mut self) -> Option<Result<(), LoadError>> {
        if self.destroyed.is_destroyed() {
            self.pending = None;
            return None;
        }
        let receiver = self.pending.take()?;
        let result = receiver.recv().unwrap_or_else(|_| {
            Err(LoadError::Network {
                message: "load worker exited without a result".to_string(),
            })
        });
        Some(self.settle(result))
    }

    fn settle(&mut self, result: Result<WaveformAudio, LoadError>) -> Result<(), LoadError> {
        match result {
            Ok(audio) => {
                self.hub
                    .emit(&WaveformEvent::DurationChanged(audio.duration()));
                info!(
                    duration = audio.duration(),
                    channels = audio.channel_count(),
                    "source ready"
                );
                self.audio = Some(audio);
                self.hub.emit(&WaveformEvent::Load);
                Ok(())
            }
            Err(err) => {
                warn!("load failed: {err}");
                self.hub.emit(&WaveformEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Element-failure recovery: hand out the cached bytes so the caller can
    /// rebuild just the playable element. Decoded data stays cached; nothing
    /// is refetched or redecoded.
    pub fn recover_element(&self) -> Result<Arc<[u8]>, LoadError> {
        match &self.audio {
            Some(audio) => Ok(Arc::clone(&audio.bytes)),
            None => Err(LoadError::Network {
                message: "no source loaded".to_string(),
            }),
        }
    }

    /// Drop the cached source so a new one can be loaded. Cancels any
    /// in-flight decode and renews the decoder for reuse.
    pub fn reset(&mut self) {
        self.audio = None;
        self.pending = None;
        self.decoder.cancel();
        self.decoder.renew();
        self.decoder.reset();
    }

    pub fn destroy(&mut self) {
        if !self.destroyed.destroy() {
            return;
        }
        self.audio = None;
        self.pending = None;
        self.decoder.cancel();
    }
}

/// Worker-side resolution: fetch, decode, and hand the pair back.
fn resolve(
    hub: &EventHub<WaveformEvent>,
    decoder: &AudioDecoder,
    options: DecodeOptions,
    source: &MediaSource,
) -> Result<WaveformAudio, LoadError> {
    let bytes: Arc<[u8]> = match source {
        MediaSource::Url(raw) => Arc::from(fetch_url(hub, raw)?),
        MediaSource::File(path) => {
            let bytes = std::fs::read(path)?;
            hub.emit(&WaveformEvent::Progress(bytes.len() as i64, bytes.len() as i64));
            Arc::from(bytes)
        }
        MediaSource::Bytes(bytes) => {
            hub.emit(&WaveformEvent::Progress(bytes.len() as i64, bytes.len() as i64));
            Arc::clone(bytes)
        }
    };
    decoder.init(Arc::clone(&bytes));
    let decoded = decoder.decode(options)?;
    Ok(WaveformAudio { bytes, decoded })
}

fn fetch_url(hub: &EventHub<WaveformEvent>, raw: &str) -> Result<Vec<u8>, LoadError> {
    let url = prepare_url(raw)?;
    let response = agent().get(&url).call().map_err(|err| match err {
        ureq::Error::Status(status, _) => LoadError::Http {
            status,
            url: raw.to_string(),
        },
        other => LoadError::Network {
            message: other.to_string(),
        },
    })?;
    // Determinate progress needs a length; -1 marks indeterminate.
    let total = response
        .header("Content-Length")
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(-1);
    if total > MAX_MEDIA_BYTES as i64 {
        return Err(LoadError::TooLarge {
            size: total as u64,
            limit: MAX_MEDIA_BYTES,
        });
    }
    let mut reader = response.into_reader();
    let mut bytes = Vec::new();
    let mut buf = [0u8; PROGRESS_CHUNK];
    let mut loaded = 0i64;
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        loaded += read as i64;
        if loaded as u64 > MAX_MEDIA_BYTES {
            return Err(LoadError::TooLarge {
                size: loaded as u64,
                limit: MAX_MEDIA_BYTES,
            });
        }
        bytes.extend_from_slice(&buf[..read]);
        hub.emit(&WaveformEvent::Progress(loaded, total));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::SampleFormat;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn wav_bytes(samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
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

    /// Serve `body` for every connection, counting requests.
    fn serve(body: Vec<u8>, with_length: bool) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            while let Ok((mut stream, _)) = listener.accept() {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let header = if with_length {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                } else {
                    "HTTP/1.0 200 OK\r\n\r\n".to_string()
                };
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        (format!("http://{addr}/audio.wav"), hits)
    }

    fn loader_with_events() -> (MediaLoader, Arc<Mutex<Vec<WaveformEvent>>>) {
        let hub = Arc::new(EventHub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.on(move |event: &WaveformEvent| sink.lock().unwrap().push(event.clone()));
        let loader = MediaLoader::new(hub, Arc::new(AudioDecoder::new()), DecodeOptions::default());
        (loader, seen)
    }

    #[test]
    fn presigned_urls_pass_through_untouched() {
        for param in SIGNATURE_PARAMS {
            let raw = format!("https://example.com/a.wav?{param}=abc123");
            assert_eq!(prepare_url(&raw).unwrap(), raw);
        }
    }

    #[test]
    fn plain_urls_get_cache_buster() {
        let prepared = prepare_url("https://example.com/a.wav?x=1").unwrap();
        assert!(prepared.contains("x=1"));
        assert!(prepared.contains("ts="));
    }

    #[test]
    fn load_is_idempotent_with_one_fetch_and_one_load_event() {
        let samples: Vec<i16> = (0..400).map(|i| (i * 50) as i16).collect();
        let (url, hits) = serve(wav_bytes(&samples), true);
        let (mut loader, events) = loader_with_events();
        let source = MediaSource::Url(url);

        loader.load(&source);
        loader.wait().expect("in flight").expect("first load");
        loader.load(&source);
        assert!(loader.wait().is_none());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let load_events = events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, WaveformEvent::Load))
            .count();
        assert_eq!(load_events, 1);
    }

    #[test]
    fn determinate_progress_reports_total_bytes() {
        let body = wav_bytes(&[0; 4096]);
        let total = body.len() as i64;
        let (url, _hits) = serve(body, true);
        let (mut loader, events) = loader_with_events();
        loader.load(&MediaSource::Url(url));
        loader.wait().expect("in flight").expect("load");
        let seen = events.lock().unwrap();
        let last_progress = seen
            .iter()
            .filter_map(|event| match event {
                WaveformEvent::Progress(loaded, total) => Some((*loaded, *total)),
                _ => None,
            })
            .next_back()
            .expect("progress events");
        assert_eq!(last_progress, (total, total));
    }

    #[test]
    fn missing_content_length_reports_indeterminate_progress() {
        let body = wav_bytes(&[0; 1024]);
        let (url, _hits) = serve(body, false);
        let (mut loader, events) = loader_with_events();
        loader.load(&MediaSource::Url(url));
        loader.wait().expect("in flight").expect("load");
        let seen = events.lock().unwrap();
        assert!(
            seen.iter()
                .any(|event| matches!(event, WaveformEvent::Progress(_, -1)))
        );
    }

    #[test]
    fn decode_failure_emits_error_event() {
        let (mut loader, events) = loader_with_events();
        let junk: Arc<[u8]> = Arc::from(vec![0u8; 64]);
        loader.load(&MediaSource::Bytes(junk));
        let result = loader.wait().expect("in flight");
        assert!(matches!(result, Err(LoadError::Decode(_))));
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|event| matches!(event, WaveformEvent::Error(_)))
        );
    }

    #[test]
    fn file_source_loads_and_emits_duration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, wav_bytes(&[100; 800])).expect("write wav");
        let (mut loader, events) = loader_with_events();
        loader.load(&MediaSource::File(path));
        loader.wait().expect("in flight").expect("load");
        let audio = loader.audio().expect("audio");
        assert!((audio.duration() - 0.1).abs() < 1e-6);
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|event| matches!(event, WaveformEvent::DurationChanged(_)))
        );
    }

    #[test]
    fn recover_element_reuses_cached_bytes_without_fetching() {
        let body = wav_bytes(&[0; 512]);
        let (url, hits) = serve(body, true);
        let (mut loader, _events) = loader_with_events();
        loader.load(&MediaSource::Url(url));
        loader.wait().expect("in flight").expect("load");
        let fetches = hits.load(Ordering::SeqCst);
        let bytes = loader.recover_element().expect("recover");
        assert!(!bytes.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), fetches);
    }

    #[test]
    fn load_settles_through_poll_not_in_the_calling_thread() {
        let (mut loader, events) = loader_with_events();
        loader.load(&MediaSource::Bytes(Arc::from(wav_bytes(&[0; 256]))));
        // The kick-off returns before the source is ready; completion is only
        // ever observed by polling.
        assert!(loader.is_loading());
        assert!(!loader.is_loaded());
        let settled = loop {
            if let Some(result) = loader.poll() {
                break result;
            }
            thread::sleep(Duration::from_millis(2));
        };
        settled.expect("load");
        assert!(loader.is_loaded());
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|event| matches!(event, WaveformEvent::Load))
        );
    }

    #[test]
    fn destroyed_loader_is_a_no_op() {
        let (mut loader, events) = loader_with_events();
        loader.destroy();
        loader.load(&MediaSource::Bytes(Arc::from(wav_bytes(&[0; 8]))));
        assert!(!loader.is_loading());
        assert!(loader.wait().is_none());
        assert!(events.lock().unwrap().is_empty());
    }
}
