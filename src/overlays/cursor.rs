//! Hover cursor: a vertical line tracking the pointer over the waveform.

use egui::Color32;

use crate::layers::Layer;
use crate::utils::color::parse_color_or;
use crate::visualizer::ViewContext;

#[derive(Clone, Debug)]
pub struct CursorOptions {
    pub color: String,
    pub width: u32,
    pub visible: bool,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            color: "#ffffff66".to_string(),
            width: 1,
            visible: true,
        }
    }
}

pub struct Cursor {
    color: Color32,
    width: u32,
    visible: bool,
    position_x: Option<f32>,
}

impl Cursor {
    pub fn new(options: &CursorOptions) -> Self {
        Self {
            color: parse_color_or(&options.color, Color32::from_white_alpha(102)),
            width: options.width.max(1),
            visible: options.visible,
            position_x: None,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Track the pointer; `None` when it leaves the container.
    pub fn on_pointer(&mut self, x: Option<f32>) {
        self.position_x = x;
    }

    pub fn position_x(&self) -> Option<f32> {
        self.position_x
    }

    /// Paint onto the controls surface. A cursor outside the waveform band is
    /// clipped by the band bounds, not hidden.
    pub fn paint(&self, layer: &mut Layer, view: &ViewContext, pixel_ratio: f32) {
        if !self.visible {
            return;
        }
        let Some(x) = self.position_x else {
            return;
        };
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerOptions;

    fn view() -> ViewContext {
        ViewContext {
            duration: 10.0,
            zoom: 1.0,
            scroll_left: 0.0,
            width: 20.0,
            height: 10.0,
            timeline_height: 0.0,
            timeline_on_top: false,
        }
    }

    #[test]
    fn paints_only_while_inside_container() {
        let mut layer = Layer::new("controls", LayerOptions::default());
        layer.resize(20.0, 10.0, 1.0);
        let mut cursor = Cursor::new(&CursorOptions::default());

        cursor.on_pointer(Some(25.0));
        cursor.paint(&mut layer, &view(), 1.0);
        assert!(layer.pixels().iter().all(|p| p.a() == 0));

        cursor.on_pointer(Some(5.0));
        cursor.paint(&mut layer, &view(), 1.0);
        assert!(layer.pixels().iter().any(|p| p.a() > 0));
    }

    #[test]
    fn hidden_cursor_paints_nothing() {
        let mut layer = Layer::new("controls", LayerOptions::default());
        layer.resize(20.0, 10.0, 1.0);
        let mut cursor = Cursor::new(&CursorOptions::default());
        cursor.set_visible(false);
        cursor.on_pointer(Some(5.0));
        cursor.paint(&mut layer, &view(), 1.0);
        assert!(layer.pixels().iter().all(|p| p.a() == 0));
    }
}
