//! The public facade: one object composing loader, decoder, visualizer,
//! player, regions, and overlays behind a single event surface.

use std::sync::Arc;

use egui::{Color32, ColorImage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::decoder::{AudioDecoder, DecodeOptions, DecodedAudio, DecoderBackendKind};
use crate::events::{DestroyFlag, EventHub, SubscriptionId, WaveformEvent};
use crate::layers::Layer;
use crate::loader::{LoadError, MediaLoader, MediaSource};
use crate::overlays::{
    Cursor, CursorOptions, Playhead, PlayheadOptions, Timeline, TimelineOptions, Tooltip,
};
use crate::player::{
    BufferBackend, PlaybackBackend, Player, PlayerBackendKind, PlayerError, StreamBackend,
};
use crate::regions::{RegionId, RegionOptions, RegionSnapshot, Regions};
use crate::utils::color::{parse_color_or, parse_rgba_or};
use crate::visualizer::{ViewContext, Visualizer, VisualizerOptions};

/// Z-order of the regions surface, between the waveform and the controls.
const REGIONS_LAYER_INDEX: i32 = 2;

/// Umbrella over the per-concern errors a facade call can surface.
#[derive(Debug, thiserror::Error)]
pub enum WaveformError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// Construction-time configuration. Unknown fields in serialized input are
/// ignored rather than rejected.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WaveformOptions {
    pub url: Option<String>,
    pub zoom: f32,
    pub max_zoom: f32,
    pub volume: f32,
    pub rate: f32,
    pub muted: bool,
    pub split_channels: bool,
    pub player_backend: PlayerBackendKind,
    pub decoder_backend: Option<DecoderBackendKind>,
    pub background_color: String,
    pub waveform_color: String,
    pub cursor_color: String,
    pub playhead_color: String,
    pub region_color: String,
    pub show_timeline: bool,
    pub timeline_height: f32,
    pub timeline_on_top: bool,
    /// Regions installed as soon as the audio loads.
    pub regions: Vec<RegionSnapshot>,
}

impl Default for WaveformOptions {
    fn default() -> Self {
        Self {
            url: None,
            zoom: 1.0,
            max_zoom: 512.0,
            volume: 1.0,
            rate: 1.0,
            muted: false,
            split_channels: false,
            player_backend: PlayerBackendKind::default(),
            decoder_backend: None,
            background_color: "#18181c".to_string(),
            waveform_color: "#94c4ff".to_string(),
            cursor_color: "#ffffff66".to_string(),
            playhead_color: "#ff4a4a".to_string(),
            region_color: "#4084f7".to_string(),
            show_timeline: true,
            timeline_height: 20.0,
            timeline_on_top: false,
            regions: Vec::new(),
        }
    }
}

pub struct Waveform {
    hub: Arc<EventHub<WaveformEvent>>,
    options: WaveformOptions,
    decoder: Arc<AudioDecoder>,
    loader: MediaLoader,
    visualizer: Visualizer,
    regions: Regions,
    player: Option<Player>,
    cursor: Cursor,
    playhead: Playhead,
    timeline: Timeline,
    tooltip: Tooltip,
    destroyed: DestroyFlag,
    #[cfg(test)]
    test_backend: Option<Box<dyn PlaybackBackend>>,
}

impl Waveform {
    pub fn new(options: WaveformOptions) -> Self {
        let hub = Arc::new(EventHub::new());
        let decoder = Arc::new(AudioDecoder::new());
        let loader = MediaLoader::new(
            Arc::clone(&hub),
            Arc::clone(&decoder),
            DecodeOptions {
                multi_channel: options.split_channels,
                backend: options.decoder_backend,
            },
        );
        let mut visualizer = Visualizer::new(
            Arc::clone(&hub),
            VisualizerOptions {
                background_color: parse_color_or(
                    &options.background_color,
                    Color32::from_rgb(24, 24, 28),
                ),
                waveform_color: parse_color_or(
                    &options.waveform_color,
                    Color32::from_rgb(148, 196, 255),
                ),
                max_zoom: options.max_zoom,
                timeline_height: if options.show_timeline {
                    options.timeline_height
                } else {
                    0.0
                },
                timeline_on_top: options.timeline_on_top,
            },
        );
        visualizer.set_zoom(options.zoom);
        let mut regions = Regions::new(
            Arc::clone(&hub),
            parse_rgba_or(&options.region_color, crate::regions::DEFAULT_REGION_COLOR),
        );
        regions
            .layer_group_mut()
            .base_mut()
            .set_index(REGIONS_LAYER_INDEX);
        let cursor = Cursor::new(&CursorOptions {
            color: options.cursor_color.clone(),
            ..CursorOptions::default()
        });
        let playhead = Playhead::new(&PlayheadOptions {
            color: options.playhead_color.clone(),
            ..PlayheadOptions::default()
        });
        let timeline = Timeline::new(&TimelineOptions {
            visible: options.show_timeline,
            ..TimelineOptions::default()
        });
        Self {
            hub,
            decoder,
            loader,
            visualizer,
            regions,
            player: None,
            cursor,
            playhead,
            timeline,
            tooltip: Tooltip::new(),
            destroyed: DestroyFlag::new(),
            options,
            #[cfg(test)]
            test_backend: None,
        }
    }

    /// Subscribe to the unified event surface.
    pub fn on(&self, callback: impl Fn(&WaveformEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.hub.on(callback)
    }

    pub fn off(&self, id: SubscriptionId) {
        self.hub.off(id);
    }

    pub fn is_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    pub fn duration(&self) -> f64 {
        self.visualizer.view().duration
    }

    pub fn current_time(&self) -> f64 {
        self.player
            .as_ref()
            .map(Player::current_time)
            .unwrap_or(0.0)
    }

    pub fn zoom(&self) -> f32 {
        self.visualizer.zoom()
    }

    #[cfg(test)]
    pub(crate) fn install_test_backend(&mut self, backend: Box<dyn PlaybackBackend>) {
        self.test_backend = Some(backend);
    }

    #[cfg(test)]
    pub(crate) fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    /// Kick off fetching and decoding the given source, or the configured URL
    /// when `None`. The work runs on a background worker; `tick` observes
    /// completion and resolves it through the `Load` event. Calling again
    /// while loaded or in flight is a no-op.
    pub fn load(&mut self, source: Option<MediaSource>) {
        if self.destroyed.is_destroyed() || self.loader.is_loaded() {
            return;
        }
        let source = match source {
            Some(source) => source,
            None => match &self.options.url {
                Some(url) => MediaSource::Url(url.clone()),
                None => return,
            },
        };
        self.loader.load(&source);
    }

    /// Wire a freshly settled load into the rest of the engine.
    fn attach_loaded_audio(&mut self) {
        let Some(audio) = self.loader.audio() else {
            return;
        };
        let decoded = Arc::clone(&audio.decoded);
        let bytes = Arc::clone(&audio.bytes);
        self.visualizer.attach_audio(Arc::clone(&decoded));

        let backend = self.take_backend(&bytes, &decoded);
        if let Some(backend) = backend {
            let mut player = Player::new(Arc::clone(&self.hub), backend, decoded.duration);
            player.set_volume(self.options.volume);
            if self.options.muted {
                player.set_muted(true);
            }
            if self.options.rate != 1.0 {
                player.set_rate(self.options.rate);
            }
            self.player = Some(player);
        }

        let initial: Vec<RegionOptions> = self
            .options
            .regions
            .iter()
            .map(RegionOptions::from_snapshot)
            .collect();
        for options in &initial {
            self.regions.add(options);
        }
        info!(duration = decoded.duration, "waveform ready");
    }

    #[cfg(test)]
    fn take_backend(
        &mut self,
        bytes: &Arc<[u8]>,
        decoded: &Arc<DecodedAudio>,
    ) -> Option<Box<dyn PlaybackBackend>> {
        match self.test_backend.take() {
            Some(backend) => Some(backend),
            None => Self::open_backend(self.options.player_backend, bytes, decoded),
        }
    }

    #[cfg(not(test))]
    fn take_backend(
        &mut self,
        bytes: &Arc<[u8]>,
        decoded: &Arc<DecodedAudio>,
    ) -> Option<Box<dyn PlaybackBackend>> {
        Self::open_backend(self.options.player_backend, bytes, decoded)
    }

    fn open_backend(
        kind: PlayerBackendKind,
        bytes: &Arc<[u8]>,
        decoded: &Arc<DecodedAudio>,
    ) -> Option<Box<dyn PlaybackBackend>> {
        let opened: Result<Box<dyn PlaybackBackend>, PlayerError> = match kind {
            PlayerBackendKind::Stream => StreamBackend::new(Arc::clone(bytes))
                .map(|backend| Box::new(backend) as Box<dyn PlaybackBackend>),
            PlayerBackendKind::Buffer => BufferBackend::new(decoded)
                .map(|backend| Box::new(backend) as Box<dyn PlaybackBackend>),
        };
        match opened {
            Ok(backend) => Some(backend),
            Err(err) => {
                warn!("playback backend unavailable: {err}");
                None
            }
        }
    }

    /// Recover from a playback-element failure: rebuild only the playable
    /// backend from the cached bytes, keeping the decoded data and render
    /// state intact.
    pub fn recover_playback(&mut self) -> Result<(), WaveformError> {
        if self.destroyed.is_destroyed() {
            return Ok(());
        }
        let bytes = self.loader.recover_element()?;
        let Some(audio) = self.loader.audio() else {
            return Ok(());
        };
        let decoded = Arc::clone(&audio.decoded);
        if let Some(backend) = Self::open_backend(self.options.player_backend, &bytes, &decoded) {
            let mut player = Player::new(Arc::clone(&self.hub), backend, decoded.duration);
            player.set_volume(self.options.volume);
            player.set_rate(self.options.rate);
            self.player = Some(player);
        }
        Ok(())
    }

    /// Start playback. When any regions are selected, playback loops over
    /// their union. No-op before load and after destroy.
    pub fn play(&mut self, start: Option<f64>, end: Option<f64>) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let loop_range = self.regions.selected_range();
        let Some(player) = self.player.as_mut() else {
            return;
        };
        player.set_loop(loop_range);
        if let Err(err) = player.play(start, end) {
            warn!("play failed: {err}");
            self.hub.emit(&WaveformEvent::Error(err.to_string()));
        }
    }

    pub fn pause(&mut self) {
        if let Some(player) = self.player.as_mut()
            && let Err(err) = player.pause()
        {
            warn!("pause failed: {err}");
        }
    }

    pub fn stop(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
    }

    pub fn seek(&mut self, time: f64) {
        if let Some(player) = self.player.as_mut()
            && let Err(err) = player.seek(time)
        {
            warn!("seek failed: {err}");
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(player) = self.player.as_mut() {
            player.set_volume(volume);
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        if let Some(player) = self.player.as_mut() {
            player.set_muted(muted);
        }
    }

    pub fn set_rate(&mut self, rate: f32) {
        if let Some(player) = self.player.as_mut() {
            player.set_rate(rate);
        }
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.visualizer.set_zoom(zoom);
    }

    pub fn set_scroll(&mut self, fraction: f32) {
        self.visualizer.set_scroll(fraction);
    }

    pub fn set_amplitude(&mut self, amp: f32) {
        self.visualizer.set_amplitude(amp);
    }

    pub fn observe_resize(&mut self, width: f32, height: f32, pixel_ratio: f32) {
        self.visualizer.observe_resize(width, height, pixel_ratio);
    }

    // Region CRUD, passed through to the collection.

    pub fn add_region(&mut self, options: &RegionOptions) -> Option<RegionSnapshot> {
        self.regions.add(options)
    }

    pub fn update_region(
        &mut self,
        id: RegionId,
        options: &RegionOptions,
    ) -> Option<RegionSnapshot> {
        self.regions.update(id, options)
    }

    pub fn remove_region(&mut self, id: RegionId) -> bool {
        self.regions.remove(id, false)
    }

    pub fn region_snapshots(&self) -> Vec<RegionSnapshot> {
        self.regions.snapshots()
    }

    pub fn set_regions_drawable(&mut self, drawable: bool) {
        self.regions.set_drawable(drawable);
    }

    /// Paint the region last so it sits on top of any overlapping ones.
    pub fn bring_region_to_front(&mut self, id: RegionId) {
        self.regions.bring_to_front(id);
    }

    /// Toggle one named layer. Known names: `background`, `waveform`,
    /// `regions`, `controls`, `timeline`.
    pub fn set_layer_visibility(&mut self, name: &str, visible: bool) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        let known = if name == "regions" {
            self.regions
                .layer_group_mut()
                .base_mut()
                .set_visibility(visible);
            true
        } else {
            self.visualizer.set_layer_visibility(name, visible)
        };
        if known {
            self.hub.emit(&WaveformEvent::LayersUpdated);
        }
        known
    }

    /// Look up one named layer for inspection or host-side blitting.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        if name == "regions" {
            return Some(self.regions.layer_group().base());
        }
        self.visualizer.layer(name)
    }

    pub fn is_layer_visible(&self, name: &str) -> bool {
        self.layer(name).map(Layer::is_visible).unwrap_or(false)
    }

    fn view(&self) -> ViewContext {
        *self.visualizer.view()
    }

    // Pointer routing. The host forwards pointer events in logical pixels
    // relative to the waveform surface.

    pub fn on_pointer_down(&mut self, x: f32, y: f32) {
        if self.destroyed.is_destroyed() || !self.is_loaded() {
            return;
        }
        let view = self.view();
        if self.playhead.handle_pointer_down(x, &view) {
            self.visualizer.lock_seek();
            return;
        }
        self.regions.handle_pointer_down(x, y, &view);
    }

    pub fn on_pointer_move(&mut self, x: Option<f32>, y: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let view = self.view();
        self.cursor.on_pointer(x);
        self.tooltip.on_pointer(x, &view);
        if let Some(x) = x {
            self.playhead.handle_pointer_move(x, &view);
            self.regions.handle_pointer_move(x, y, &view);
        }
    }

    pub fn on_pointer_up(&mut self, x: f32, y: f32) {
        if self.destroyed.is_destroyed() || !self.is_loaded() {
            return;
        }
        let view = self.view();
        if let Some(target) = self.playhead.handle_pointer_up() {
            self.visualizer.unlock_seek();
            self.seek(target);
            return;
        }
        if self.regions.handle_pointer_up(x, y, &view) {
            return;
        }
        // A plain click seeks, unless some gesture locked the surface.
        if !self.regions.is_locked() && !self.visualizer.is_seek_locked() {
            let time = view.x_to_time(x);
            self.seek(time);
        }
    }

    /// Advance the cooperative scheduler one step: settle an in-flight load,
    /// then playback time, then the playhead that mirrors it, then pending
    /// render work. Returns whether anything advanced.
    pub fn tick(&mut self) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        let mut worked = false;
        if let Some(result) = self.loader.poll() {
            worked = true;
            if result.is_ok() {
                self.attach_loaded_audio();
            }
        }
        if let Some(player) = self.player.as_mut() {
            worked |= player.tick();
            if !self.playhead.is_dragging() {
                self.playhead.set_position(player.current_time());
            }
        }
        worked |= self.visualizer.tick();
        worked
    }

    /// Repaint the overlay surfaces and composite every visible layer into
    /// one frame.
    pub fn render(&mut self) -> ColorImage {
        let view = self.view();
        let ratio = self.visualizer.pixel_ratio();

        self.regions
            .layer_group_mut()
            .resize(view.width, view.height, ratio);
        self.regions.render(&view);

        let controls = self.visualizer.controls_layer_mut();
        controls.clear();
        self.playhead.paint(controls, &view, ratio);
        self.cursor.paint(controls, &view, ratio);

        let markers: Vec<(f64, f64, Color32)> = self
            .regions
            .snapshots()
            .into_iter()
            .filter_map(|snapshot| {
                let region = self.regions.get(snapshot.id)?;
                region
                    .segment()
                    .show_in_timeline
                    .then(|| (snapshot.start, snapshot.end, region.handle_color()))
            })
            .collect();
        let timeline_layer = self.visualizer.timeline_layer_mut();
        self.timeline.render(timeline_layer, &view, ratio, &markers);

        self.visualizer
            .composite(&[self.regions.layer_group().base()])
    }

    pub fn tooltip(&self) -> &Tooltip {
        &self.tooltip
    }

    /// Tear everything down. Later calls on this object are silent no-ops.
    pub fn destroy(&mut self) {
        if !self.destroyed.destroy() {
            return;
        }
        if let Some(player) = self.player.as_mut() {
            player.stop();
            player.destroy();
        }
        self.player = None;
        self.regions.destroy();
        self.visualizer.destroy();
        self.loader.destroy();
        self.decoder.destroy();
        self.hub.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::mock::MockBackend;
    use crate::regions::Segment;
    use hound::SampleFormat;
    use std::sync::Mutex;

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

    /// Tick until the background load settles.
    fn drive_to_loaded(waveform: &mut Waveform) {
        for _ in 0..500 {
            waveform.tick();
            if waveform.is_loaded() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        panic!("load did not settle");
    }

    fn loaded_waveform() -> Waveform {
        let mut waveform = Waveform::new(WaveformOptions::default());
        let (backend, _log) = MockBackend::with_log();
        waveform.install_test_backend(Box::new(backend));
        // Ten seconds of audio at 8 kHz.
        let samples: Vec<i16> = (0..80_000).map(|i| (i % 200) as i16 * 100).collect();
        waveform.load(Some(MediaSource::Bytes(Arc::from(wav_bytes(&samples)))));
        drive_to_loaded(&mut waveform);
        waveform.observe_resize(400.0, 80.0, 1.0);
        waveform
    }

    #[test]
    fn options_ignore_unknown_fields() {
        let raw = r#"{
            "zoom": 2.5,
            "playerBackend": "buffer",
            "someFutureKnob": true,
            "nested": {"ignored": 1}
        }"#;
        let options: WaveformOptions = serde_json::from_str(raw).expect("parse options");
        assert_eq!(options.zoom, 2.5);
        assert_eq!(options.player_backend, PlayerBackendKind::Buffer);
        assert_eq!(options.volume, 1.0);
    }

    #[test]
    fn playback_is_a_no_op_before_load() {
        let mut waveform = Waveform::new(WaveformOptions::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        waveform.on(move |event: &WaveformEvent| sink.lock().unwrap().push(event.clone()));
        waveform.play(None, None);
        waveform.pause();
        waveform.seek(3.0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn load_without_source_or_url_is_a_no_op() {
        let mut waveform = Waveform::new(WaveformOptions::default());
        waveform.load(None);
        waveform.tick();
        assert!(!waveform.is_loaded());
    }

    #[test]
    fn load_returns_immediately_and_settles_through_tick() {
        let mut waveform = Waveform::new(WaveformOptions::default());
        let (backend, _log) = MockBackend::with_log();
        waveform.install_test_backend(Box::new(backend));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        waveform.on(move |event: &WaveformEvent| sink.lock().unwrap().push(event.clone()));

        waveform.load(Some(MediaSource::Bytes(Arc::from(wav_bytes(&[50; 8_000])))));
        // The caller's thread is not held; readiness arrives on a later tick.
        assert!(!waveform.is_loaded());
        drive_to_loaded(&mut waveform);

        let seen = events.lock().unwrap();
        let duration_at = seen
            .iter()
            .position(|event| matches!(event, WaveformEvent::DurationChanged(_)))
            .expect("duration event");
        let load_at = seen
            .iter()
            .position(|event| matches!(event, WaveformEvent::Load))
            .expect("load event");
        assert!(duration_at < load_at);
    }

    #[test]
    fn load_is_idempotent() {
        let mut waveform = loaded_waveform();
        let duration = waveform.duration();
        waveform.load(Some(MediaSource::Bytes(Arc::from(wav_bytes(&[1; 800])))));
        waveform.tick();
        assert_eq!(waveform.duration(), duration);
    }

    #[test]
    fn selected_regions_confine_playback_to_their_union() {
        let mut waveform = loaded_waveform();
        for (start, end) in [(2.0, 5.0), (3.0, 8.0)] {
            waveform.add_region(&RegionOptions {
                start: Some(start),
                end: Some(end),
                selected: Some(true),
                ..RegionOptions::default()
            });
        }
        waveform.play(None, None);
        let player = waveform.player().expect("player");
        assert_eq!(player.loop_range(), Some((2.0, 8.0)));
        assert_eq!(player.current_time(), 2.0);
    }

    #[test]
    fn initial_regions_are_installed_on_load() {
        let mut options = WaveformOptions::default();
        options.regions = vec![RegionSnapshot {
            id: Segment::new(0.0, 0.0).id(),
            start: 1.0,
            end: 2.0,
            labels: vec!["intro".to_string()],
            color: "#aa0000".to_string(),
            selected: false,
            locked: false,
        }];
        let mut waveform = Waveform::new(options);
        let (backend, _log) = MockBackend::with_log();
        waveform.install_test_backend(Box::new(backend));
        waveform.load(Some(MediaSource::Bytes(Arc::from(wav_bytes(&[50; 800])))));
        drive_to_loaded(&mut waveform);
        let snapshots = waveform.region_snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].labels, vec!["intro".to_string()]);
    }

    #[test]
    fn layer_visibility_toggles_and_notifies() {
        let mut waveform = loaded_waveform();
        let updates = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&updates);
        waveform.on(move |event: &WaveformEvent| {
            if matches!(event, WaveformEvent::LayersUpdated) {
                *sink.lock().unwrap() += 1;
            }
        });
        assert!(waveform.set_layer_visibility("timeline", false));
        assert!(!waveform.is_layer_visible("timeline"));
        assert!(waveform.set_layer_visibility("regions", false));
        assert!(!waveform.set_layer_visibility("nonsense", false));
        assert_eq!(*updates.lock().unwrap(), 2);
    }

    #[test]
    fn click_seeks_but_region_gesture_suppresses_it() {
        let mut waveform = loaded_waveform();
        // A plain click seeks to the time under the pointer.
        waveform.on_pointer_down(100.0, 30.0);
        waveform.on_pointer_up(100.0, 30.0);
        assert!((waveform.current_time() - 2.5).abs() < 1e-6);

        // A drag that draws a region must not also seek on release.
        waveform.on_pointer_down(200.0, 30.0);
        waveform.on_pointer_move(Some(260.0), 30.0);
        let before = waveform.current_time();
        waveform.on_pointer_up(260.0, 30.0);
        assert_eq!(waveform.current_time(), before);
        assert_eq!(waveform.region_snapshots().len(), 1);
    }

    #[test]
    fn playhead_follows_playback_time() {
        let mut waveform = loaded_waveform();
        waveform.play(Some(1.5), None);
        waveform.tick();
        let time = waveform.current_time();
        assert!((waveform.playhead.position() - time).abs() < 1e-6);
    }

    #[test]
    fn render_composites_a_frame() {
        let mut waveform = loaded_waveform();
        while waveform.tick() {}
        let frame = waveform.render();
        assert_eq!(frame.size, [400, 80]);
    }

    #[test]
    fn destroy_is_idempotent_and_silences_the_api() {
        let mut waveform = loaded_waveform();
        waveform.destroy();
        waveform.destroy();
        waveform.play(None, None);
        assert!(!waveform.tick());
        assert!(waveform.add_region(&RegionOptions::default()).is_none());
        assert!(!waveform.set_layer_visibility("waveform", false));
    }
}
