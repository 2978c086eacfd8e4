//! Layered waveform renderer and viewport controller.
//!
//! Owns the background/waveform/controls/timeline surfaces, the
//! zoom/scroll/amplitude state, and the budgeted column-stroking render loop.
//! Redraws are coalesced onto the next scheduler tick; a render pass in
//! flight serializes against new requests through the `drawing` guard.

mod sampling;
mod view;

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use egui::{Color32, ColorImage};
use tracing::{debug, warn};

use crate::decoder::DecodedAudio;
use crate::events::{DestroyFlag, EventHub, WaveformEvent};
use crate::layers::{Layer, LayerOptions};

pub use sampling::{ColumnEnvelope, EnvelopeCache, sample_channel_columns};
pub use view::ViewContext;

/// Budget for one synchronous slice of render work.
const RENDER_BUDGET: Duration = Duration::from_millis(10);
/// Columns painted between budget checks.
const RENDER_BATCH: usize = 64;
/// Below this many visible frames a partial redraw saves nothing; redraw in
/// full instead.
const MIN_PARTIAL_FRAMES: usize = 512;

/// Visual configuration accepted at construction.
#[derive(Clone, Debug)]
pub struct VisualizerOptions {
    pub background_color: Color32,
    pub waveform_color: Color32,
    pub max_zoom: f32,
    pub timeline_height: f32,
    pub timeline_on_top: bool,
}

impl Default for VisualizerOptions {
    fn default() -> Self {
        Self {
            background_color: Color32::from_rgb(24, 24, 28),
            waveform_color: Color32::from_rgb(148, 196, 255),
            max_zoom: 512.0,
            timeline_height: 20.0,
            timeline_on_top: false,
        }
    }
}

/// Render-relevant state at the time a pass was issued. A scroll-only delta
/// against the previous snapshot selects the partial path.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RenderSnapshot {
    width_px: usize,
    zoom: f32,
    amp: f32,
    scroll_px: usize,
}

/// An in-flight render pass: the viewport columns still to stroke, reading
/// from full-width envelopes shared with every other pass at this zoom.
struct RenderJob {
    generation: u64,
    span: Range<usize>,
    next: usize,
    scroll_px: usize,
    amp: f32,
    snapshot: RenderSnapshot,
    envelopes: Vec<ColumnEnvelope>,
}

pub struct Visualizer {
    hub: Arc<EventHub<WaveformEvent>>,
    options: VisualizerOptions,
    view: ViewContext,
    amp: f32,
    pixel_ratio: f32,
    background: Layer,
    waveform: Layer,
    controls: Layer,
    timeline: Layer,
    audio: Option<Arc<DecodedAudio>>,
    cache: EnvelopeCache,
    cache_token: u64,
    last_render: Option<RenderSnapshot>,
    pending_draw: bool,
    drawing: bool,
    generation: u64,
    job: Option<RenderJob>,
    seek_locked: bool,
    destroyed: DestroyFlag,
    #[cfg(test)]
    budget_override: Option<Duration>,
}

impl Visualizer {
    pub fn new(hub: Arc<EventHub<WaveformEvent>>, options: VisualizerOptions) -> Self {
        let layer = |name: &str, index: i32| {
            Layer::new(
                name,
                LayerOptions {
                    index,
                    offscreen: true,
                    ..LayerOptions::default()
                },
            )
        };
        let view = ViewContext {
            duration: 0.0,
            zoom: 1.0,
            scroll_left: 0.0,
            width: 0.0,
            height: 0.0,
            timeline_height: options.timeline_height,
            timeline_on_top: options.timeline_on_top,
        };
        Self {
            hub,
            view,
            amp: 1.0,
            pixel_ratio: 1.0,
            background: layer("background", 0),
            waveform: layer("waveform", 1),
            controls: layer("controls", 3),
            timeline: layer("timeline", 4),
            audio: None,
            cache: EnvelopeCache::new(),
            cache_token: 0,
            last_render: None,
            pending_draw: false,
            drawing: false,
            generation: 0,
            job: None,
            seek_locked: false,
            destroyed: DestroyFlag::new(),
            options,
            #[cfg(test)]
            budget_override: None,
        }
    }

    pub fn view(&self) -> &ViewContext {
        &self.view
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn zoom(&self) -> f32 {
        self.view.zoom
    }

    pub fn scroll_left(&self) -> f32 {
        self.view.scroll_left
    }

    pub fn amplitude(&self) -> f32 {
        self.amp
    }

    /// Attach a freshly decoded source. Invalidates every cached envelope
    /// keyed to the previous source.
    pub fn attach_audio(&mut self, audio: Arc<DecodedAudio>) {
        if self.destroyed.is_destroyed() {
            return;
        }
        self.view.duration = audio.duration;
        self.audio = Some(audio);
        self.cache_token = self.cache_token.wrapping_add(1);
        self.last_render = None;
        self.request_draw();
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.view.duration = duration.max(0.0);
    }

    /// Container resize: recompute surfaces, invalidate the incremental
    /// render cache, and force a redraw.
    pub fn observe_resize(&mut self, width: f32, height: f32, pixel_ratio: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        self.view.width = width.max(0.0);
        self.view.height = height.max(0.0);
        self.pixel_ratio = pixel_ratio.max(0.1);
        let (band_top, band_bottom) = self.view.waveform_band();
        let band_height = (band_bottom - band_top).max(0.0);
        self.background.resize(width, height, pixel_ratio);
        self.waveform.resize(width, band_height, pixel_ratio);
        self.controls.resize(width, height, pixel_ratio);
        self.timeline.resize(width, self.view.timeline_height, pixel_ratio);
        self.last_render = None;
        self.draw(false, true);
    }

    /// Clamp and apply a zoom factor, re-clamping scroll into the new range.
    pub fn set_zoom(&mut self, zoom: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let zoom = zoom.clamp(1.0, self.options.max_zoom.max(1.0));
        if (zoom - self.view.zoom).abs() < f32::EPSILON {
            return;
        }
        self.view.zoom = zoom;
        self.view.scroll_left = self.view.scroll_left.min(self.max_scroll());
        self.hub.emit(&WaveformEvent::Zoom(zoom));
        self.request_draw();
    }

    fn max_scroll(&self) -> f32 {
        (1.0 - 1.0 / self.view.zoom.max(1.0)).max(0.0)
    }

    /// Scroll offset as a fraction of total zoomed width.
    pub fn set_scroll(&mut self, fraction: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let clamped = fraction.clamp(0.0, self.max_scroll());
        if (clamped - self.view.scroll_left).abs() < f32::EPSILON {
            return;
        }
        self.view.scroll_left = clamped;
        self.hub.emit(&WaveformEvent::Scroll(clamped));
        self.request_draw();
    }

    pub fn set_amplitude(&mut self, amp: f32) {
        if self.destroyed.is_destroyed() {
            return;
        }
        let amp = amp.max(1.0);
        if (amp - self.amp).abs() < f32::EPSILON {
            return;
        }
        self.amp = amp;
        self.request_draw();
    }

    /// Suppress click-to-seek while a drag gesture is resolving.
    pub fn lock_seek(&mut self) {
        self.seek_locked = true;
    }

    pub fn unlock_seek(&mut self) {
        self.seek_locked = false;
    }

    pub fn is_seek_locked(&self) -> bool {
        self.seek_locked
    }

    /// Queue a redraw on the next tick. Multiple requests within one pass
    /// coalesce into a single render.
    pub fn request_draw(&mut self) {
        if self.destroyed.is_destroyed() {
            return;
        }
        self.pending_draw = true;
    }

    /// Issue a render pass now.
    ///
    /// `dry` repaints static surfaces without re-stroking the waveform;
    /// `force` preempts an in-flight pass instead of dropping the request.
    /// Returns false when the request was dropped by the reentrancy guard.
    pub fn draw(&mut self, dry: bool, force: bool) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        if self.drawing {
            if !force {
                warn!("redraw requested while a render pass is active; dropping");
                return false;
            }
            self.generation = self.generation.wrapping_add(1);
            self.job = None;
            self.drawing = false;
        }
        self.paint_background();
        if dry {
            return true;
        }
        let Some(audio) = self.audio.clone() else {
            self.waveform.clear();
            return true;
        };
        let width_px = self.waveform.width();
        if width_px == 0 {
            return true;
        }
        let zoomed_px = ((width_px as f64) * self.view.zoom.max(1.0) as f64).round() as usize;
        let scroll_px = (self.view.scroll_left as f64 * zoomed_px as f64).round() as usize;
        let snapshot = RenderSnapshot {
            width_px,
            zoom: self.view.zoom,
            amp: self.amp,
            scroll_px,
        };
        let channels = audio.channel_count.max(1).min(audio.chunks.len().max(1));
        let envelopes: Vec<ColumnEnvelope> = (0..channels)
            .map(|channel| {
                self.cache
                    .get_or_compute(self.cache_token, &audio, channel, zoomed_px)
            })
            .collect();
        let visible_frames = (audio.data_length() as f64 / self.view.zoom.max(1.0) as f64) as usize;

        let span = match self.last_render {
            Some(previous)
                if previous.width_px == snapshot.width_px
                    && previous.zoom == snapshot.zoom
                    && previous.amp == snapshot.amp
                    && previous.scroll_px != snapshot.scroll_px
                    && visible_frames >= MIN_PARTIAL_FRAMES =>
            {
                let dx = snapshot.scroll_px as i64 - previous.scroll_px as i64;
                if dx.unsigned_abs() as usize >= width_px {
                    self.waveform.clear();
                    0..width_px
                } else if dx > 0 {
                    // Scrolled right: shift raster left, expose the right strip.
                    self.waveform.shift_x(-(dx as i32));
                    width_px - dx as usize..width_px
                } else {
                    self.waveform.shift_x((-dx) as i32);
                    0..(-dx) as usize
                }
            }
            _ => {
                self.waveform.clear();
                0..width_px
            }
        };
        debug!(
            columns = span.len(),
            full = span.len() == width_px,
            "render pass issued"
        );
        self.drawing = true;
        self.generation = self.generation.wrapping_add(1);
        self.job = Some(RenderJob {
            generation: self.generation,
            next: span.start,
            span,
            scroll_px,
            amp: self.amp,
            snapshot,
            envelopes,
        });
        self.step_job();
        true
    }

    /// Best-effort cancellation of an in-flight render pass. Safe to call
    /// repeatedly. Returns whether a pass was actually cancelled.
    pub fn cancel_render(&mut self) -> bool {
        let cancelled = self.job.is_some();
        self.generation = self.generation.wrapping_add(1);
        self.job = None;
        self.drawing = false;
        cancelled
    }

    /// Advance the cooperative scheduler: continue an in-flight render pass
    /// within the time budget, then issue any coalesced redraw request.
    /// Returns whether any work was performed.
    pub fn tick(&mut self) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        let mut worked = self.step_job();
        if !self.drawing && self.pending_draw {
            self.pending_draw = false;
            worked |= self.draw(false, false);
        }
        worked
    }

    /// True while a render pass is queued or in flight.
    pub fn is_rendering(&self) -> bool {
        self.drawing || self.pending_draw
    }

    fn budget(&self) -> Duration {
        #[cfg(test)]
        if let Some(over) = self.budget_override {
            return over;
        }
        RENDER_BUDGET
    }

    fn step_job(&mut self) -> bool {
        let Some(mut job) = self.job.take() else {
            return false;
        };
        // A newer render pass superseded this one; drop it silently.
        if job.generation != self.generation {
            return false;
        }
        let budget = self.budget();
        let started = std::time::Instant::now();
        let channels = job.envelopes.len().max(1);
        let band_full = self.waveform.height();
        let band_height = band_full / channels;
        let color = self.options.waveform_color;
        let mut done = false;
        loop {
            if job.next >= job.span.end {
                done = true;
                break;
            }
            let batch_end = (job.next + RENDER_BATCH).min(job.span.end);
            for x in job.next..batch_end {
                let column = job.scroll_px + x;
                for (channel, envelope) in job.envelopes.iter().enumerate() {
                    let (min, max) = envelope.get(column).copied().unwrap_or((0.0, 0.0));
                    self.waveform.stroke_column(
                        x,
                        min * job.amp,
                        max * job.amp,
                        channel * band_height,
                        band_height,
                        color,
                    );
                }
            }
            job.next = batch_end;
            if started.elapsed() >= budget {
                break;
            }
        }
        if done {
            self.last_render = Some(job.snapshot);
            self.drawing = false;
        } else {
            self.job = Some(job);
        }
        true
    }

    fn paint_background(&mut self) {
        self.background.fill(self.options.background_color);
        let channels = self
            .audio
            .as_ref()
            .map(|audio| audio.channel_count.max(1))
            .unwrap_or(1);
        let (band_top, band_bottom) = self.view.waveform_band();
        let top = (band_top * self.pixel_ratio).round() as i32;
        let band_px = ((band_bottom - band_top).max(0.0) * self.pixel_ratio).round() as i32;
        let per_channel = band_px / channels.max(1) as i32;
        let grid = self.options.waveform_color.gamma_multiply(0.25);
        for channel in 0..channels {
            let mid = top + channel as i32 * per_channel + per_channel / 2;
            let width = self.background.width() as i32;
            self.background.draw_hline(mid, 0, width.saturating_sub(1), 1, grid);
        }
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        match name {
            "background" => Some(&self.background),
            "waveform" => Some(&self.waveform),
            "controls" => Some(&self.controls),
            "timeline" => Some(&self.timeline),
            _ => None,
        }
    }

    /// Overlay surface the playhead and cursor repaint each frame.
    pub fn controls_layer_mut(&mut self) -> &mut Layer {
        &mut self.controls
    }

    /// Strip the timeline overlay owns.
    pub fn timeline_layer_mut(&mut self) -> &mut Layer {
        &mut self.timeline
    }

    pub fn waveform_layer(&self) -> &Layer {
        &self.waveform
    }

    /// Toggle visibility of one of the visualizer-owned layers. Returns false
    /// for unknown names.
    pub fn set_layer_visibility(&mut self, name: &str, visible: bool) -> bool {
        let layer = match name {
            "background" => &mut self.background,
            "waveform" => &mut self.waveform,
            "controls" => &mut self.controls,
            "timeline" => &mut self.timeline,
            _ => return false,
        };
        layer.set_visibility(visible);
        self.request_draw();
        true
    }

    /// Composite every offscreen layer, plus the caller-supplied extras, into
    /// a single image in ascending z-order.
    pub fn composite(&self, extra: &[&Layer]) -> ColorImage {
        let mut target = Layer::new("output", LayerOptions::default());
        target.resize(self.view.width, self.view.height, self.pixel_ratio);
        let mut sources: Vec<&Layer> =
            vec![&self.background, &self.waveform, &self.controls, &self.timeline];
        sources.extend_from_slice(extra);
        sources.retain(|layer| layer.is_offscreen());
        sources.sort_by_key(|layer| layer.index());
        for layer in sources {
            layer.transfer_to(&mut target);
        }
        target.to_color_image()
    }

    pub fn destroy(&mut self) {
        if !self.destroyed.destroy() {
            return;
        }
        self.job = None;
        self.drawing = false;
        self.pending_draw = false;
        self.audio = None;
    }
}
