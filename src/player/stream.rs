//! Streaming playback backend: decodes the source bytes on the fly.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};

use super::{PlaybackBackend, PlayerError};

/// Wraps a decoder-fed sink the way a native media element would be wrapped.
pub struct StreamBackend {
    stream: OutputStream,
    sink: Option<Sink>,
    bytes: Arc<[u8]>,
    volume: f32,
    rate: f32,
    /// Whether playback ever successfully started. Pausing an element whose
    /// play request has not resolved yet throws, so `pause` is a no-op until
    /// this flips.
    has_played: bool,
}

impl StreamBackend {
    pub fn new(bytes: Arc<[u8]>) -> Result<Self, PlayerError> {
        let stream = OutputStreamBuilder::open_default_stream().map_err(|err| {
            PlayerError::Output {
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            stream,
            sink: None,
            bytes,
            volume: 1.0,
            rate: 1.0,
            has_played: false,
        })
    }

    fn decoder(&self) -> Result<Decoder<Cursor<Arc<[u8]>>>, PlayerError> {
        Decoder::new(Cursor::new(Arc::clone(&self.bytes))).map_err(|err| PlayerError::Decode {
            message: err.to_string(),
        })
    }
}

impl PlaybackBackend for StreamBackend {
    fn start(&mut self, position: f64, rate: f32, volume: f32) -> Result<(), PlayerError> {
        if let Some(old) = self.sink.take() {
            old.stop();
        }
        let mut source = self.decoder()?;
        if position > 0.0 {
            source
                .try_seek(Duration::from_secs_f64(position))
                .map_err(|err| PlayerError::Seek {
                    message: err.to_string(),
                })?;
        }
        self.volume = volume;
        self.rate = rate;
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(volume);
        sink.set_speed(rate);
        sink.append(source);
        sink.play();
        self.sink = Some(sink);
        self.has_played = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        if !self.has_played {
            return Ok(());
        }
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), PlayerError> {
        match &self.sink {
            Some(sink) => {
                sink.play();
                Ok(())
            }
            None => self.start(0.0, self.rate, self.volume),
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        sink.try_seek(Duration::from_secs_f64(position.max(0.0)))
            .map_err(|err| PlayerError::Seek {
                message: err.to_string(),
            })
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
