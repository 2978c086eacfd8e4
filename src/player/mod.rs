//! Playback state machine and the backends that drive actual output.
//!
//! The [`Player`] owns playback time as the single source of truth; overlays
//! and the visualizer only read it. Time advances on [`Player::tick`] from
//! measured wall-clock deltas scaled by the playback rate, so scheduler
//! jitter self-corrects instead of accumulating.

mod buffer;
mod stream;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::events::{DestroyFlag, EventHub, WaveformEvent};

pub use buffer::BufferBackend;
pub use stream::StreamBackend;

/// Errors raised by playback backends.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No usable audio output could be opened.
    #[error("Audio output unavailable: {message}")]
    Output { message: String },
    /// The playback decoder rejected the source bytes.
    #[error("Playback decode failed: {message}")]
    Decode { message: String },
    /// The backend could not seek to the requested position.
    #[error("Seek failed: {message}")]
    Seek { message: String },
}

/// Which backend a waveform should play through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerBackendKind {
    /// Decode the source bytes on the fly through a streaming element.
    #[default]
    Stream,
    /// Play the already-decoded sample buffer through a one-shot source.
    Buffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Seam between the player state machine and an output implementation. Both
/// concrete backends are known at design time; tests install a recording
/// double.
pub trait PlaybackBackend: Send {
    /// Begin a fresh playback session at `position` seconds.
    fn start(&mut self, position: f64, rate: f32, volume: f32) -> Result<(), PlayerError>;
    /// Suspend output, keeping the session resumable.
    fn pause(&mut self) -> Result<(), PlayerError>;
    /// Resume a paused session.
    fn resume(&mut self) -> Result<(), PlayerError>;
    /// Tear the session down.
    fn stop(&mut self);
    /// Jump to `position` seconds within the active session.
    fn seek(&mut self, position: f64) -> Result<(), PlayerError>;
    fn set_volume(&mut self, volume: f32);
    fn set_rate(&mut self, rate: f32);
}

pub struct Player {
    hub: Arc<EventHub<WaveformEvent>>,
    backend: Box<dyn PlaybackBackend>,
    state: PlaybackState,
    current_time: f64,
    duration: f64,
    rate: f32,
    volume: f32,
    last_volume: f32,
    loop_range: Option<(f64, f64)>,
    play_end: Option<f64>,
    ended: bool,
    last_tick: Option<Instant>,
    destroyed: DestroyFlag,
    #[cfg(test)]
    elapsed_override: Option<std::time::Duration>,
}

impl Player {
    pub fn new(
        hub: Arc<EventHub<WaveformEvent>>,
        backend: Box<dyn PlaybackBackend>,
        duration: f64,
    ) -> Self {
        Self {
            hub,
            backend,
            state: PlaybackState::Stopped,
            current_time: 0.0,
            duration: duration.max(0.0),
            rate: 1.0,
            volume: 1.0,
            last_volume: 1.0,
            loop_range: None,
            play_end: None,
            ended: false,
            last_tick: None,
            destroyed: DestroyFlag::new(),
            #[cfg(test)]
            elapsed_override: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn loop_range(&self) -> Option<(f64, f64)> {
        self.loop_range
    }

    /// Confine playback to a time range, looping at its end. Installed before
    /// `play()` from the union of the selected regions.
    pub fn set_loop(&mut self, range: Option<(f64, f64)>) {
        self.loop_range = range.map(|(start, end)| {
            if start <= end { (start, end) } else { (end, start) }
        });
    }

    /// Begin or resume playback.
    ///
    /// After a `playend` the position resets to `from` (or 0). With an active
    /// loop the position is pulled into the loop range before starting.
    pub fn play(&mut self, from: Option<f64>, to: Option<f64>) -> Result<(), PlayerError> {
        if self.destroyed.is_destroyed() || self.duration <= 0.0 {
            return Ok(());
        }
        if self.ended {
            self.current_time = from.unwrap_or(0.0);
            self.ended = false;
        } else if let Some(from) = from {
            self.current_time = from;
        }
        if let Some((loop_start, loop_end)) = self.loop_range
            && (self.current_time < loop_start || self.current_time >= loop_end)
        {
            self.current_time = loop_start;
        }
        self.current_time = self.current_time.clamp(0.0, self.duration);
        self.play_end = to;
        if self.state == PlaybackState::Paused {
            self.backend.resume()?;
        } else {
            self.backend.start(self.current_time, self.rate, self.volume)?;
        }
        self.state = PlaybackState::Playing;
        self.last_tick = Some(Instant::now());
        self.hub.emit(&WaveformEvent::Play);
        Ok(())
    }

    /// Suspend playback, preserving position for a seamless resume.
    pub fn pause(&mut self) -> Result<(), PlayerError> {
        if self.destroyed.is_destroyed() || self.state != PlaybackState::Playing {
            return Ok(());
        }
        self.backend.pause()?;
        self.state = PlaybackState::Paused;
        self.last_tick = None;
        self.hub.emit(&WaveformEvent::Pause);
        Ok(())
    }

    /// Tear playback down, clearing the loop and resetting the position.
    pub fn stop(&mut self) {
        if self.destroyed.is_destroyed() || self.state == PlaybackState::Stopped {
            return;
        }
        self.backend.stop();
        self.state = PlaybackState::Stopped;
        self.loop_range = None;
        self.play_end = None;
        self.last_tick = None;
        self.current_time = 0.0;
        self.hub.emit(&WaveformEvent::Pause);
    }

    /// Jump to an absolute position in seconds.
    pub fn seek(&mut self, time: f64) -> Result<(), PlayerError> {
        if self.destroyed.is_destroyed() || self.duration <= 0.0 {
            return Ok(());
        }
        let time = time.clamp(0.0, self.duration);
        self.current_time = time;
        self.ended = false;
        if self.state == PlaybackState::Playing {
            self.backend.seek(time)?;
        }
        self.hub.emit(&WaveformEvent::Seek(time));
        Ok(())
    }

    /// Volume in `0..=1`. Zero implicitly mutes; the last non-zero value is
    /// remembered for unmute.
    pub fn set_volume(&mut self, volume: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        if volume > 0.0 {
            self.last_volume = volume;
        }
        self.volume = volume;
        self.backend.set_volume(volume);
        self.hub.emit(&WaveformEvent::VolumeChanged(volume));
    }

    pub fn is_muted(&self) -> bool {
        self.volume == 0.0
    }

    /// Mute keeps the remembered volume; unmute restores it (1.0 when none
    /// was ever set).
    pub fn set_muted(&mut self, muted: bool) {
        if muted {
            if self.volume > 0.0 {
                self.last_volume = self.volume;
            }
            self.volume = 0.0;
            self.backend.set_volume(0.0);
            self.hub.emit(&WaveformEvent::VolumeChanged(0.0));
        } else if self.volume == 0.0 {
            let restored = self.last_volume.max(f32::EPSILON).min(1.0);
            self.volume = restored;
            self.backend.set_volume(restored);
            self.hub.emit(&WaveformEvent::VolumeChanged(restored));
        }
    }

    pub fn set_rate(&mut self, rate: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let rate = rate.max(0.01);
        self.rate = rate;
        self.backend.set_rate(rate);
        self.hub.emit(&WaveformEvent::RateChanged(rate));
    }

    fn elapsed(&mut self) -> f64 {
        #[cfg(test)]
        if let Some(elapsed) = self.elapsed_override.take() {
            self.last_tick = Some(Instant::now());
            return elapsed.as_secs_f64();
        }
        let now = Instant::now();
        let elapsed = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        elapsed
    }

    /// Advance playback time by the measured wall-clock delta scaled by rate.
    /// Emits `playing`, wraps active loops, and emits `playend` at the end of
    /// the effective range. Returns whether time advanced.
    pub fn tick(&mut self) -> bool {
        if self.destroyed.is_destroyed() || self.state != PlaybackState::Playing {
            return false;
        }
        let delta = self.elapsed() * self.rate as f64;
        self.current_time += delta;

        if let Some((loop_start, loop_end)) = self.loop_range {
            if self.current_time >= loop_end {
                debug!(loop_start, loop_end, "loop wrap");
                self.current_time = loop_start;
                // Restart the session at the loop start rather than stopping.
                if self.backend.seek(loop_start).is_err() {
                    let _ = self.backend.start(loop_start, self.rate, self.volume);
                }
                self.hub.emit(&WaveformEvent::Play);
            }
            self.hub.emit(&WaveformEvent::Playing(self.current_time));
            return true;
        }

        let end = self.play_end.unwrap_or(self.duration).min(self.duration);
        if self.current_time >= end {
            self.current_time = end;
            self.backend.stop();
            self.state = PlaybackState::Stopped;
            self.play_end = None;
            self.last_tick = None;
            self.ended = true;
            self.hub.emit(&WaveformEvent::Playing(end));
            self.hub.emit(&WaveformEvent::PlayEnd);
            return true;
        }
        self.hub.emit(&WaveformEvent::Playing(self.current_time));
        true
    }

    pub fn destroy(&mut self) {
        if !self.destroyed.destroy() {
            return;
        }
        self.backend.stop();
        self.state = PlaybackState::Stopped;
        self.last_tick = None;
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{BackendCall, MockBackend};
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn player_with_log(duration: f64) -> (Player, Arc<Mutex<Vec<BackendCall>>>) {
        let (backend, log) = MockBackend::with_log();
        let hub = Arc::new(EventHub::new());
        (Player::new(hub, Box::new(backend), duration), log)
    }

    fn events_player(duration: f64) -> (Player, Arc<Mutex<Vec<WaveformEvent>>>) {
        let hub = Arc::new(EventHub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.on(move |event: &WaveformEvent| sink.lock().unwrap().push(event.clone()));
        let (backend, _) = MockBackend::with_log();
        (Player::new(hub, Box::new(backend), duration), seen)
    }

    #[test]
    fn loop_wraps_to_union_start() {
        let (mut player, log) = player_with_log(10.0);
        // Union of selected regions [2,5] and [3,8].
        player.set_loop(Some((2.0, 8.0)));
        player.play(None, None).unwrap();
        assert_eq!(player.current_time(), 2.0);

        player.elapsed_override = Some(Duration::from_secs_f64(6.5));
        player.tick();
        assert!((player.current_time() - 2.0).abs() < 1e-9);
        assert!(player.is_playing());
        assert!(log.lock().unwrap().contains(&BackendCall::Seek(2.0)));
    }

    #[test]
    fn reaching_end_emits_playend_and_stops() {
        let (mut player, events) = events_player(10.0);
        player.play(Some(9.0), None).unwrap();
        player.elapsed_override = Some(Duration::from_secs_f64(1.5));
        player.tick();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.current_time(), 10.0);
        assert!(events.lock().unwrap().contains(&WaveformEvent::PlayEnd));

        // A replay after `playend` resets to the requested origin.
        player.play(None, None).unwrap();
        assert_eq!(player.current_time(), 0.0);
    }

    #[test]
    fn rate_scales_elapsed_time() {
        let (mut player, _log) = player_with_log(100.0);
        player.set_rate(2.0);
        player.play(Some(0.0), None).unwrap();
        player.elapsed_override = Some(Duration::from_secs(3));
        player.tick();
        assert!((player.current_time() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn pause_preserves_position_for_resume() {
        let (mut player, log) = player_with_log(100.0);
        player.play(Some(4.0), None).unwrap();
        player.elapsed_override = Some(Duration::from_secs(2));
        player.tick();
        player.pause().unwrap();
        assert_eq!(player.state(), PlaybackState::Paused);
        let position = player.current_time();
        assert!((position - 6.0).abs() < 1e-9);

        player.play(None, None).unwrap();
        assert!((player.current_time() - position).abs() < 1e-9);
        assert!(log.lock().unwrap().contains(&BackendCall::Resume));
    }

    #[test]
    fn stop_clears_loop_and_position() {
        let (mut player, _log) = player_with_log(100.0);
        player.set_loop(Some((5.0, 9.0)));
        player.play(None, None).unwrap();
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.loop_range(), None);
        assert_eq!(player.current_time(), 0.0);
    }

    #[test]
    fn zero_volume_mutes_and_unmute_restores_last() {
        let (mut player, _log) = player_with_log(10.0);
        player.set_volume(0.6);
        player.set_volume(0.0);
        assert!(player.is_muted());
        player.set_muted(false);
        assert!((player.volume() - 0.6).abs() < 1e-6);

        // Never-set volume restores the default of 1.0... after an explicit mute.
        let (mut fresh, _log) = player_with_log(10.0);
        fresh.set_muted(true);
        fresh.set_muted(false);
        assert!((fresh.volume() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn seek_while_playing_reaches_backend() {
        let (mut player, log) = player_with_log(50.0);
        player.play(None, None).unwrap();
        player.seek(12.5).unwrap();
        assert!(log.lock().unwrap().contains(&BackendCall::Seek(12.5)));
        assert_eq!(player.current_time(), 12.5);
    }

    #[test]
    fn seek_clamps_into_track() {
        let (mut player, _log) = player_with_log(50.0);
        player.seek(-3.0).unwrap();
        assert_eq!(player.current_time(), 0.0);
        player.seek(500.0).unwrap();
        assert_eq!(player.current_time(), 50.0);
    }

    #[test]
    fn destroyed_player_is_a_no_op() {
        let (mut player, log) = player_with_log(10.0);
        player.destroy();
        player.play(None, None).unwrap();
        player.set_volume(0.2);
        assert!(!player.tick());
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(*log.lock().unwrap(), vec![BackendCall::Stop]);
    }

    #[test]
    fn play_inside_loop_keeps_position() {
        let (mut player, _log) = player_with_log(20.0);
        player.set_loop(Some((2.0, 8.0)));
        player.play(Some(5.0), None).unwrap();
        assert_eq!(player.current_time(), 5.0);
        // Outside the loop the position snaps to the loop start.
        player.stop();
        player.set_loop(Some((2.0, 8.0)));
        player.play(Some(15.0), None).unwrap();
        assert_eq!(player.current_time(), 2.0);
    }
}
