//! Resumable slice steppers over the decode backends.
//!
//! A stepper decodes one bounded number of frames per call and keeps its
//! position between calls, so the owner can interleave cancellation checks
//! and other work between slices.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::backend::{DecoderBackendKind, sniff};
use super::DecodeError;

/// Position-keeping slice decoder over one of the two backends.
pub(crate) enum SliceStepper<'a> {
    Wav(WavStepper<'a>),
    Symphonia(SymphoniaStepper),
}

impl<'a> SliceStepper<'a> {
    /// Open a stepper over `bytes`, sniffing the container unless forced.
    pub(crate) fn open(
        bytes: &'a [u8],
        forced: Option<DecoderBackendKind>,
    ) -> Result<Self, DecodeError> {
        let kind = forced.unwrap_or_else(|| sniff(bytes));
        match kind {
            DecoderBackendKind::Wav => Ok(Self::Wav(WavStepper::open(bytes)?)),
            DecoderBackendKind::Symphonia => Ok(Self::Symphonia(SymphoniaStepper::open(bytes)?)),
        }
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        match self {
            Self::Wav(stepper) => stepper.spec.sample_rate,
            Self::Symphonia(stepper) => stepper.sample_rate,
        }
    }

    pub(crate) fn channels(&self) -> usize {
        match self {
            Self::Wav(stepper) => stepper.spec.channels as usize,
            Self::Symphonia(stepper) => stepper.channels,
        }
    }

    /// Decode up to `max_frames` more frames of interleaved samples.
    ///
    /// Returns `None` once the source is exhausted.
    pub(crate) fn next_slice(
        &mut self,
        max_frames: usize,
    ) -> Result<Option<Vec<f32>>, DecodeError> {
        match self {
            Self::Wav(stepper) => stepper.next_slice(max_frames),
            Self::Symphonia(stepper) => stepper.next_slice(max_frames),
        }
    }
}

/// Plain wav slices via `hound`.
pub(crate) struct WavStepper<'a> {
    reader: hound::WavReader<Cursor<&'a [u8]>>,
    spec: hound::WavSpec,
    int_scale: f32,
}

impl<'a> WavStepper<'a> {
    fn open(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let reader =
            hound::WavReader::new(Cursor::new(bytes)).map_err(|err| DecodeError::Invalid {
                message: err.to_string(),
            })?;
        let spec = reader.spec();
        let int_scale = (1i64 << spec.bits_per_sample.saturating_sub(1)).max(1) as f32;
        Ok(Self {
            reader,
            spec,
            int_scale,
        })
    }

    fn next_slice(&mut self, max_frames: usize) -> Result<Option<Vec<f32>>, DecodeError> {
        let channels = (self.spec.channels as usize).max(1);
        let budget = max_frames.max(1) * channels;
        let mut slice = Vec::with_capacity(budget);
        match self.spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(budget) {
                    let sample = sample.map_err(|source| DecodeError::Sample { source })?;
                    slice.push(sample.clamp(-1.0, 1.0));
                }
            }
            hound::SampleFormat::Int => {
                for sample in self.reader.samples::<i32>().take(budget) {
                    let sample = sample.map_err(|source| DecodeError::Sample { source })?;
                    slice.push((sample as f32 / self.int_scale).clamp(-1.0, 1.0));
                }
            }
        }
        // Drop a trailing partial frame from a truncated file.
        slice.truncate(slice.len() - slice.len() % channels);
        if slice.is_empty() {
            return Ok(None);
        }
        Ok(Some(slice))
    }
}

/// Compressed-container slices via `symphonia`.
pub(crate) struct SymphoniaStepper {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    pending: Vec<f32>,
    eof: bool,
}

impl SymphoniaStepper {
    fn open(bytes: &[u8]) -> Result<Self, DecodeError> {
        let stream = MediaSourceStream::new(
            Box::new(Cursor::new(bytes.to_vec())),
            Default::default(),
        );
        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| DecodeError::Invalid {
                message: err.to_string(),
            })?;
        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::Invalid {
                message: "no default audio track".to_string(),
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params.sample_rate.unwrap_or(44_100);
        let channels = params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(1)
            .max(1);
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|err| DecodeError::Backend {
                message: err.to_string(),
            })?;
        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            pending: Vec::new(),
            eof: false,
        })
    }

    fn next_slice(&mut self, max_frames: usize) -> Result<Option<Vec<f32>>, DecodeError> {
        let target = max_frames.max(1) * self.channels;
        while self.pending.len() < target && !self.eof {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.eof = true;
                    break;
                }
                Err(err) => {
                    return Err(DecodeError::Backend {
                        message: err.to_string(),
                    });
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(buffer) => {
                    let spec = *buffer.spec();
                    let mut samples =
                        SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                    samples.copy_interleaved_ref(buffer);
                    self.pending.extend_from_slice(samples.samples());
                }
                // A corrupt packet is skipped rather than failing the decode.
                Err(SymphoniaError::DecodeError(err)) => {
                    debug!("skipping undecodable packet: {err}");
                }
                Err(err) => {
                    return Err(DecodeError::Backend {
                        message: err.to_string(),
                    });
                }
            }
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = self.pending.len().min(target);
        let take = take - take % self.channels;
        if take == 0 {
            return Ok(None);
        }
        let slice: Vec<f32> = self.pending.drain(..take).collect();
        Ok(Some(slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for &sample in samples {
                writer.write_sample(sample).expect("write");
            }
            writer.finalize().expect("finalize");
        }
        cursor.into_inner()
    }

    #[test]
    fn wav_stepper_resumes_between_slices() {
        let samples: Vec<i16> = (0..10).map(|i| i * 1000).collect();
        let bytes = wav_bytes(1, &samples);
        let mut stepper = SliceStepper::open(&bytes, None).expect("open");

        let first = stepper.next_slice(4).expect("slice").expect("data");
        let second = stepper.next_slice(4).expect("slice").expect("data");
        let third = stepper.next_slice(4).expect("slice").expect("data");
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 4);
        assert_eq!(third.len(), 2);
        assert!(stepper.next_slice(4).expect("slice").is_none());

        let expected_first: Vec<f32> = (0..4).map(|i| (i * 1000) as f32 / 32_768.0).collect();
        for (got, expected) in first.iter().zip(expected_first) {
            assert!((got - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn wav_stepper_keeps_frames_whole_for_stereo() {
        let samples: Vec<i16> = (0..10).collect();
        let bytes = wav_bytes(2, &samples);
        let mut stepper = SliceStepper::open(&bytes, None).expect("open");
        assert_eq!(stepper.channels(), 2);
        let slice = stepper.next_slice(3).expect("slice").expect("data");
        assert_eq!(slice.len() % 2, 0);
        assert_eq!(slice.len(), 6);
    }

    #[test]
    fn symphonia_stepper_decodes_wav_when_forced() {
        let samples: Vec<i16> = (0..64).map(|i| i * 100).collect();
        let bytes = wav_bytes(1, &samples);
        let mut stepper =
            SliceStepper::open(&bytes, Some(DecoderBackendKind::Symphonia)).expect("open");
        assert_eq!(stepper.sample_rate(), 8_000);
        let mut decoded = Vec::new();
        while let Some(slice) = stepper.next_slice(16).expect("slice") {
            assert!(slice.len() <= 16);
            decoded.extend(slice);
        }
        assert_eq!(decoded.len(), 64);
    }

    #[test]
    fn open_rejects_unrecognized_bytes() {
        let err = SliceStepper::open(&[0u8, 1, 2, 3], None);
        assert!(err.is_err());
    }
}
