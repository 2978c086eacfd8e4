//! Playhead: the draggable marker showing current playback time.

use egui::Color32;

use crate::layers::Layer;
use crate::utils::color::parse_color_or;
use crate::visualizer::ViewContext;

/// Pixel distance within which a press grabs the playhead.
const GRAB_PX: f32 = 4.0;

#[derive(Clone, Debug)]
pub struct PlayheadOptions {
    pub color: String,
    pub width: u32,
    pub draggable: bool,
    pub visible: bool,
    /// Initial position in seconds. Negative values are a caller bug and
    /// panic at construction.
    pub position: f64,
}

impl Default for PlayheadOptions {
    fn default() -> Self {
        Self {
            color: "#ff4a4a".to_string(),
            width: 1,
            draggable: true,
            visible: true,
            position: 0.0,
        }
    }
}

pub struct Playhead {
    color: Color32,
    width: u32,
    draggable: bool,
    visible: bool,
    position: f64,
    dragging: bool,
}

impl Playhead {
    /// Panics when `options.position` is negative.
    pub fn new(options: &PlayheadOptions) -> Self {
        assert!(
            options.position >= 0.0,
            "playhead position must be non-negative, got {}",
            options.position
        );
        Self {
            color: parse_color_or(&options.color, Color32::from_rgb(255, 74, 74)),
            width: options.width.max(1),
            draggable: options.draggable,
            visible: options.visible,
            position: options.position,
            dragging: false,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Panics on negative positions; clamping here would hide caller bugs.
    pub fn set_position(&mut self, position: f64) {
        assert!(
            position >= 0.0,
            "playhead position must be non-negative, got {position}"
        );
        self.position = position;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Grab the playhead when the press lands within the grab zone. Returns
    /// true when a drag begins; the caller must lock seeking for its duration.
    pub fn handle_pointer_down(&mut self, x: f32, view: &ViewContext) -> bool {
        if !self.draggable || !self.visible {
            return false;
        }
        let head_x = view.time_to_x(self.position);
        if (x - head_x).abs() <= GRAB_PX {
            self.dragging = true;
            return true;
        }
        false
    }

    pub fn handle_pointer_move(&mut self, x: f32, view: &ViewContext) {
        if self.dragging {
            self.position = view.x_to_time(x).clamp(0.0, view.duration);
        }
    }

    /// Finish a drag. Returns the seek target when a drag was in progress.
    pub fn handle_pointer_up(&mut self) -> Option<f64> {
        if !self.dragging {
            return None;
        }
        self.dragging = false;
        Some(self.position)
    }

    pub fn paint(&self, layer: &mut Layer, view: &ViewContext, pixel_ratio: f32) {
        if !self.visible {
            return;
        }
        let x = view.time_to_x(self.position);
        if x < 0.0 || x > view.width {
            return;
        }
        let (band_top, band_bottom) = view.waveform_band();
        layer.draw_vline(
            (x * pixel_ratio).round() as i32,
            (band_top * pixel_ratio).round() as i32,
            (band_bottom * pixel_ratio).round() as i32 - 1,
            self.width,
            self.color,
        );
    }
}
