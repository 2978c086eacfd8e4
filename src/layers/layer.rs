use egui::{Color32, ColorImage};
use serde::{Deserialize, Serialize};

use crate::utils::color::{apply_opacity, blend_multiply, blend_over};

/// How a layer's pixels combine with the surface below during compositing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeOperation {
    /// Standard alpha blend on top of the destination.
    #[default]
    SourceOver,
    /// Blend underneath existing destination pixels.
    DestinationOver,
    /// Replace destination pixels outright.
    Copy,
    /// Channel-wise multiply.
    Multiply,
}

/// Construction parameters for a layer.
#[derive(Clone, Copy, Debug)]
pub struct LayerOptions {
    /// Z-order; composited ascending.
    pub index: i32,
    pub opacity: f32,
    pub composite: CompositeOperation,
    /// Off-screen layers participate in `transfer_to` compositing; the final
    /// visible surface is the one on-screen layer.
    pub offscreen: bool,
    pub pixel_ratio: f32,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            index: 0,
            opacity: 1.0,
            composite: CompositeOperation::SourceOver,
            offscreen: true,
            pixel_ratio: 1.0,
        }
    }
}

/// One drawable RGBA surface with compositing parameters.
pub struct Layer {
    name: String,
    index: i32,
    opacity: f32,
    composite: CompositeOperation,
    visible: bool,
    offscreen: bool,
    pixel_ratio: f32,
    width: usize,
    height: usize,
    pixels: Vec<Color32>,
}

impl Layer {
    /// Create an empty zero-sized layer; call [`Layer::resize`] before drawing.
    pub fn new(name: impl Into<String>, options: LayerOptions) -> Self {
        Self {
            name: name.into(),
            index: options.index,
            opacity: options.opacity.clamp(0.0, 1.0),
            composite: options.composite,
            visible: true,
            offscreen: options.offscreen,
            pixel_ratio: options.pixel_ratio.max(0.1),
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn set_index(&mut self, index: i32) {
        self.index = index;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn composite(&self) -> CompositeOperation {
        self.composite
    }

    pub fn set_composite(&mut self, composite: CompositeOperation) {
        self.composite = composite;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// External control surface: hide or show the layer independent of state.
    pub fn set_visibility(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Device-pixel width (logical width scaled by pixel ratio).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Resize to logical dimensions, reallocating and clearing the surface.
    pub fn resize(&mut self, logical_width: f32, logical_height: f32, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio.max(0.1);
        self.width = (logical_width.max(0.0) * self.pixel_ratio).round() as usize;
        self.height = (logical_height.max(0.0) * self.pixel_ratio).round() as usize;
        self.pixels = vec![Color32::TRANSPARENT; self.width * self.height];
    }

    /// Clear every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(Color32::TRANSPARENT);
    }

    /// Fill the whole surface with one color.
    pub fn fill(&mut self, color: Color32) {
        self.pixels.fill(color);
    }

    pub(crate) fn pixel(&self, x: usize, y: usize) -> Option<Color32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    pub(crate) fn put_pixel(&mut self, x: usize, y: usize, color: Color32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = y * self.width + x;
        self.pixels[idx] = blend_over(self.pixels[idx], color);
    }

    /// Source-over fill of an axis-aligned rectangle in device pixels.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let x0 = x.max(0) as usize;
        let y0 = y.max(0) as usize;
        let x1 = ((x + w as i32).max(0) as usize).min(self.width);
        let y1 = ((y + h as i32).max(0) as usize).min(self.height);
        for row in y0..y1 {
            for col in x0..x1 {
                let idx = row * self.width + col;
                self.pixels[idx] = blend_over(self.pixels[idx], color);
            }
        }
    }

    /// Vertical line of `thickness` device pixels centered on `x`.
    pub fn draw_vline(&mut self, x: i32, y0: i32, y1: i32, thickness: u32, color: Color32) {
        let (top, bottom) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        let offset = (thickness.max(1) / 2) as i32;
        self.fill_rect(
            x - offset,
            top,
            thickness.max(1),
            (bottom - top).max(0) as u32 + 1,
            color,
        );
    }

    /// Horizontal line of `thickness` device pixels centered on `y`.
    pub fn draw_hline(&mut self, y: i32, x0: i32, x1: i32, thickness: u32, color: Color32) {
        let (left, right) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let offset = (thickness.max(1) / 2) as i32;
        self.fill_rect(
            left,
            y - offset,
            (right - left).max(0) as u32 + 1,
            thickness.max(1),
            color,
        );
    }

    /// Solid column from `min` to `max` amplitude in `[-1, 1]`, used when
    /// stroking waveform extrema.
    pub fn stroke_column(&mut self, x: usize, min: f32, max: f32, band_top: usize, band_height: usize, color: Color32) {
        if band_height == 0 || x >= self.width {
            return;
        }
        let mid = band_top as f32 + (band_height.saturating_sub(1)) as f32 / 2.0;
        let half = ((band_height.saturating_sub(1)) as f32 / 2.0).max(0.5);
        let y_top = (mid - max.clamp(-1.0, 1.0) * half).round() as i32;
        let y_bottom = (mid - min.clamp(-1.0, 1.0) * half).round() as i32;
        self.draw_vline(x as i32, y_top, y_bottom, 1, color);
    }

    /// Shift the raster horizontally by `dx` device pixels, clearing the
    /// exposed strip. Positive `dx` moves content right.
    pub fn shift_x(&mut self, dx: i32) {
        if dx == 0 || self.width == 0 {
            return;
        }
        let shift = dx.unsigned_abs() as usize;
        if shift >= self.width {
            self.clear();
            return;
        }
        for row in 0..self.height {
            let start = row * self.width;
            let row_slice = &mut self.pixels[start..start + self.width];
            if dx > 0 {
                row_slice.copy_within(0..self.width - shift, shift);
                row_slice[..shift].fill(Color32::TRANSPARENT);
            } else {
                row_slice.copy_within(shift.., 0);
                row_slice[self.width - shift..].fill(Color32::TRANSPARENT);
            }
        }
    }

    /// Composite this layer onto `target` using this layer's composite
    /// operation and opacity. Sizes must match; mismatches clip.
    pub fn transfer_to(&self, target: &mut Layer) {
        if !self.visible {
            return;
        }
        let width = self.width.min(target.width);
        let height = self.height.min(target.height);
        for y in 0..height {
            for x in 0..width {
                let src = apply_opacity(self.pixels[y * self.width + x], self.opacity);
                let idx = y * target.width + x;
                let dst = target.pixels[idx];
                target.pixels[idx] = match self.composite {
                    CompositeOperation::SourceOver => blend_over(dst, src),
                    CompositeOperation::DestinationOver => blend_over(src, dst),
                    CompositeOperation::Copy => src,
                    CompositeOperation::Multiply => blend_multiply(dst, src),
                };
            }
        }
    }

    /// Snapshot the surface as an egui image for display by the host.
    pub fn to_color_image(&self) -> ColorImage {
        ColorImage::new([self.width, self.height], self.pixels.clone())
    }

    /// Raw pixels, used by render-equivalence tests.
    pub fn pixels(&self) -> &[Color32] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_layer(width: f32, height: f32) -> Layer {
        let mut layer = Layer::new("test", LayerOptions::default());
        layer.resize(width, height, 1.0);
        layer
    }

    #[test]
    fn resize_applies_pixel_ratio() {
        let mut layer = Layer::new("hidpi", LayerOptions::default());
        layer.resize(10.0, 4.0, 2.0);
        assert_eq!((layer.width(), layer.height()), (20, 8));
    }

    #[test]
    fn fill_rect_clips_to_surface() {
        let mut layer = test_layer(4.0, 4.0);
        layer.fill_rect(-2, -2, 3, 3, Color32::RED);
        assert_eq!(layer.pixel(0, 0), Some(Color32::RED));
        assert_eq!(layer.pixel(1, 1), Some(Color32::TRANSPARENT));
    }

    #[test]
    fn shift_right_moves_pixels_and_clears_exposed_strip() {
        let mut layer = test_layer(4.0, 1.0);
        layer.fill_rect(0, 0, 1, 1, Color32::RED);
        layer.shift_x(2);
        assert_eq!(layer.pixel(2, 0), Some(Color32::RED));
        assert_eq!(layer.pixel(0, 0), Some(Color32::TRANSPARENT));
    }

    #[test]
    fn shift_left_moves_pixels_and_clears_exposed_strip() {
        let mut layer = test_layer(4.0, 1.0);
        layer.fill_rect(3, 0, 1, 1, Color32::GREEN);
        layer.shift_x(-3);
        assert_eq!(layer.pixel(0, 0), Some(Color32::GREEN));
        assert_eq!(layer.pixel(3, 0), Some(Color32::TRANSPARENT));
    }

    #[test]
    fn shift_larger_than_width_clears_everything() {
        let mut layer = test_layer(2.0, 1.0);
        layer.fill(Color32::BLUE);
        layer.shift_x(5);
        assert!(layer.pixels().iter().all(|p| *p == Color32::TRANSPARENT));
    }

    #[test]
    fn transfer_skips_invisible_layers() {
        let mut source = test_layer(2.0, 2.0);
        source.fill(Color32::RED);
        source.set_visibility(false);
        let mut target = test_layer(2.0, 2.0);
        source.transfer_to(&mut target);
        assert!(target.pixels().iter().all(|p| *p == Color32::TRANSPARENT));
    }

    #[test]
    fn transfer_copy_replaces_destination() {
        let mut source = test_layer(1.0, 1.0);
        source.set_composite(CompositeOperation::Copy);
        source.fill(Color32::from_rgba_unmultiplied(1, 2, 3, 128));
        let mut target = test_layer(1.0, 1.0);
        target.fill(Color32::WHITE);
        source.transfer_to(&mut target);
        assert_eq!(
            target.pixel(0, 0),
            Some(Color32::from_rgba_unmultiplied(1, 2, 3, 128))
        );
    }

    #[test]
    fn stroke_column_spans_min_to_max() {
        let mut layer = test_layer(1.0, 11.0);
        layer.stroke_column(0, -1.0, 1.0, 0, 11, Color32::WHITE);
        for y in 0..11 {
            assert_eq!(layer.pixel(0, y), Some(Color32::WHITE), "row {y}");
        }
    }
}
