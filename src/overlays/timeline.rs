//! Time ruler rendered above or below the waveform band.

use egui::Color32;

use crate::layers::Layer;
use crate::overlays::format_timecode;
use crate::utils::color::parse_color_or;
use crate::visualizer::ViewContext;

/// Minimum pixel spacing between major ticks before stepping up an interval.
const MIN_MAJOR_SPACING_PX: f32 = 60.0;
/// Minor ticks per major interval.
const MINOR_PER_MAJOR: u32 = 5;

#[derive(Clone, Debug)]
pub struct TimelineOptions {
    pub color: String,
    pub visible: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            color: "#9aa0a6".to_string(),
            visible: true,
        }
    }
}

/// Choose a 1/2/5 x 10^n tick interval (seconds) wide enough that major ticks
/// sit at least [`MIN_MAJOR_SPACING_PX`] apart.
pub fn tick_interval(seconds_per_pixel: f64) -> f64 {
    let minimum = seconds_per_pixel * MIN_MAJOR_SPACING_PX as f64;
    let mut magnitude = 10f64.powf(minimum.max(1e-6).log10().floor());
    loop {
        for step in [1.0, 2.0, 5.0] {
            let candidate = step * magnitude;
            if candidate >= minimum {
                return candidate;
            }
        }
        magnitude *= 10.0;
    }
}

pub struct Timeline {
    color: Color32,
    visible: bool,
}

impl Timeline {
    pub fn new(options: &TimelineOptions) -> Self {
        Self {
            color: parse_color_or(&options.color, Color32::from_rgb(154, 160, 166)),
            visible: options.visible,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Redraw the ruler strip. Called on duration changes, zoom, scroll,
    /// and resize; `markers` are the `[start, end]` spans of regions flagged
    /// for timeline display.
    pub fn render(
        &self,
        layer: &mut Layer,
        view: &ViewContext,
        pixel_ratio: f32,
        markers: &[(f64, f64, Color32)],
    ) {
        layer.clear();
        if !self.visible || view.duration <= 0.0 || view.width <= 0.0 {
            return;
        }
        let strip_height = (view.timeline_height * pixel_ratio).round() as i32;
        if strip_height <= 0 {
            return;
        }
        let baseline = if view.timeline_on_top { strip_height - 1 } else { 0 };
        let width_px = layer.width() as i32;
        layer.draw_hline(baseline, 0, width_px.saturating_sub(1), 1, self.color);

        let seconds_per_pixel = view.duration / view.zoomed_width() as f64;
        let major = tick_interval(seconds_per_pixel);
        let minor = major / MINOR_PER_MAJOR as f64;
        let window_start = view.x_to_time(0.0);
        let window_end = view.x_to_time(view.width);

        let major_len = strip_height * 2 / 3;
        let minor_len = strip_height / 3;
        let mut tick = (window_start / minor).floor() * minor;
        while tick <= window_end {
            if tick >= 0.0 && tick <= view.duration {
                let is_major = (tick / major - (tick / major).round()).abs() < 1e-6;
                let length = if is_major { major_len } else { minor_len };
                let x = (view.time_to_x(tick) * pixel_ratio).round() as i32;
                let (y0, y1) = if view.timeline_on_top {
                    (baseline - length, baseline)
                } else {
                    (baseline, baseline + length)
                };
                layer.draw_vline(x, y0, y1, 1, self.color);
            }
            tick += minor;
        }

        // Region markers requested through show_in_timeline.
        let marker_y = if view.timeline_on_top { 0 } else { strip_height - 2 };
        for &(start, end, color) in markers {
            let x0 = (view.time_to_x(start) * pixel_ratio).round() as i32;
            let x1 = (view.time_to_x(end) * pixel_ratio).round() as i32;
            layer.fill_rect(x0, marker_y, (x1 - x0).max(1) as u32, 2, color);
        }
    }

    /// Text labels for the visible major ticks, as `(logical_x, label)`
    /// pairs. The layer is a raw pixel buffer with no font rasterizer, so
    /// the host draws these with its own text stack.
    pub fn labels(&self, view: &ViewContext) -> Vec<(f32, String)> {
        if !self.visible || view.duration <= 0.0 || view.width <= 0.0 {
            return Vec::new();
        }
        let seconds_per_pixel = view.duration / view.zoomed_width() as f64;
        let major = tick_interval(seconds_per_pixel);
        let window_start = view.x_to_time(0.0);
        let window_end = view.x_to_time(view.width);

        let mut labels = Vec::new();
        let mut tick = (window_start / major).floor() * major;
        while tick <= window_end {
            if tick >= 0.0 && tick <= view.duration {
                labels.push((view.time_to_x(tick), format_timecode(tick)));
            }
            tick += major;
        }
        labels
    }
}
