//! Hover tooltip showing the timecode under the pointer.

use crate::visualizer::ViewContext;

/// Format seconds as `mm:ss.mmm`. Hours fold into the minute count.
pub fn format_timecode(seconds: f64) -> String {
    let clamped = seconds.max(0.0);
    let total_millis = (clamped * 1000.0).round() as u64;
    let minutes = total_millis / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{minutes:02}:{secs:02}.{millis:03}")
}

/// Pointer-following timecode readout. The host draws the text; this tracks
/// position and content.
#[derive(Default)]
pub struct Tooltip {
    visible: bool,
    x: f32,
    text: String,
}

impl Tooltip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from the pointer position; `None` hides the tooltip.
    pub fn on_pointer(&mut self, x: Option<f32>, view: &ViewContext) {
        match x {
            Some(x) if x >= 0.0 && x <= view.width => {
                self.visible = true;
                self.x = x;
                self.text = format_timecode(view.x_to_time(x));
            }
            _ => self.visible = false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn position_x(&self) -> f32 {
        self.x
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
