//! Viewport geometry shared by rendering, overlays, and hit-testing.

/// Snapshot of the visible viewport: logical (CSS-like) pixel units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewContext {
    /// Track duration in seconds.
    pub duration: f64,
    /// Horizontal magnification, `>= 1`.
    pub zoom: f32,
    /// Scroll offset as a fraction of the total zoomed width, `0..1`.
    pub scroll_left: f32,
    /// Container width in logical pixels.
    pub width: f32,
    /// Container height in logical pixels.
    pub height: f32,
    /// Height of the timeline strip in logical pixels.
    pub timeline_height: f32,
    /// Whether the timeline strip sits above the waveform band.
    pub timeline_on_top: bool,
}

impl ViewContext {
    /// Total virtual width of the zoomed waveform in logical pixels.
    pub fn zoomed_width(&self) -> f32 {
        self.width * self.zoom.max(1.0)
    }

    /// Map a viewport x coordinate to a time in seconds.
    pub fn x_to_time(&self, x: f32) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        let zoomed = self.zoomed_width().max(1.0) as f64;
        self.scroll_left as f64 * self.duration + (x as f64 / zoomed) * self.duration
    }

    /// Map a time in seconds to a viewport x coordinate. May fall outside
    /// `0..width` when the time is scrolled out of view.
    pub fn time_to_x(&self, time: f64) -> f32 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        let fraction = time / self.duration - self.scroll_left as f64;
        (fraction * self.zoomed_width() as f64) as f32
    }

    /// Vertical band `[top, bottom]` occupied by the waveform, excluding the
    /// timeline strip.
    pub fn waveform_band(&self) -> (f32, f32) {
        if self.timeline_on_top {
            (self.timeline_height, self.height)
        } else {
            (0.0, (self.height - self.timeline_height).max(0.0))
        }
    }

    /// Vertical band `[top, bottom]` occupied by the timeline strip.
    pub fn timeline_band(&self) -> (f32, f32) {
        if self.timeline_on_top {
            (0.0, self.timeline_height)
        } else {
            ((self.height - self.timeline_height).max(0.0), self.height)
        }
    }
}
