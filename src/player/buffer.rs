//! Buffer playback backend: plays the already-decoded sample data through a
//! fresh one-shot source per session.

use std::sync::Arc;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};

use super::{PlaybackBackend, PlayerError};
use crate::decoder::DecodedAudio;

pub struct BufferBackend {
    stream: OutputStream,
    sink: Option<Sink>,
    /// Interleaved copy of the decoded chunks, sliced per play session.
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
    volume: f32,
    rate: f32,
}

impl BufferBackend {
    pub fn new(audio: &DecodedAudio) -> Result<Self, PlayerError> {
        let stream = OutputStreamBuilder::open_default_stream().map_err(|err| {
            PlayerError::Output {
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            stream,
            sink: None,
            samples: Arc::new(audio.interleaved()),
            channels: audio.channel_count.max(1).min(u16::MAX as usize) as u16,
            sample_rate: audio.sample_rate.max(1),
            volume: 1.0,
            rate: 1.0,
        })
    }

    /// Build a one-shot source starting at `position` seconds. Buffer sources
    /// cannot be restarted after `stop`, so every session gets a fresh one.
    fn source_at(&self, position: f64) -> SamplesBuffer {
        let frame = (position.max(0.0) * self.sample_rate as f64) as usize;
        let start = (frame * self.channels as usize).min(self.samples.len());
        SamplesBuffer::new(self.channels, self.sample_rate, self.samples[start..].to_vec())
    }

    fn connect(&mut self, position: f64, volume: f32) {
        if let Some(old) = self.sink.take() {
            old.stop();
        }
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(volume);
        sink.set_speed(self.rate);
        sink.append(self.source_at(position));
        sink.play();
        self.sink = Some(sink);
    }
}

impl PlaybackBackend for BufferBackend {
    fn start(&mut self, position: f64, rate: f32, volume: f32) -> Result<(), PlayerError> {
        self.volume = volume;
        self.rate = rate;
        self.connect(position, volume);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), PlayerError> {
        if let Some(sink) = &self.sink {
            sink.play();
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    /// Seeking reconnects a fresh source at the new position. Output is muted
    /// for the reconnect window so the splice is not audible, then restored.
    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        if self.sink.is_none() {
            return Ok(());
        }
        self.connect(position, 0.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
        if let Some(sink) = &self.sink {
            sink.set_speed(rate);
        }
    }
}
