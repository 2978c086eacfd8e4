use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::layers::LogicalLayerId;
use crate::utils::color::{RgbaColor, parse_rgba_or};

use super::segment::{RegionId, Segment};

/// Default fill color for regions created without an explicit color.
pub const DEFAULT_REGION_COLOR: RgbaColor = RgbaColor::opaque(64, 132, 247);

/// Alpha applied to a region's body fill; handles and labels stay opaque.
const BODY_ALPHA: u8 = 70;
const SELECTED_BODY_ALPHA: u8 = 110;

/// A labeled time range: a [`Segment`] plus annotation labels and a display
/// color. A plain segment is a region with no labels.
#[derive(Clone, Debug)]
pub struct Region {
    pub(crate) segment: Segment,
    pub labels: Vec<String>,
    /// Unmultiplied so snapshots re-emit the exact bytes that were parsed.
    pub color: RgbaColor,
    /// Logical layer inside the regions group this region paints into.
    pub(crate) layer: Option<LogicalLayerId>,
}

impl Region {
    pub fn new(segment: Segment, labels: Vec<String>, color: RgbaColor) -> Self {
        Self {
            segment,
            labels,
            color,
            layer: None,
        }
    }

    pub fn id(&self) -> RegionId {
        self.segment.id()
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn segment_mut(&mut self) -> &mut Segment {
        &mut self.segment
    }

    pub fn start(&self) -> f64 {
        self.segment.start()
    }

    pub fn end(&self) -> f64 {
        self.segment.end()
    }

    /// Body fill color, dimmed unless selected.
    pub fn body_color(&self) -> Color32 {
        if self.segment.selected {
            self.color.with_alpha(SELECTED_BODY_ALPHA)
        } else {
            self.color.with_alpha(BODY_ALPHA)
        }
    }

    /// Boundary handle color: fully opaque.
    pub fn handle_color(&self) -> Color32 {
        self.color.with_alpha(255)
    }

    /// Serializable snapshot; feeding it back into `add_region` reproduces
    /// `start`, `end`, `labels` and `color`.
    pub fn snapshot(&self) -> RegionSnapshot {
        RegionSnapshot {
            id: self.id(),
            start: self.start(),
            end: self.end(),
            labels: self.labels.clone(),
            color: color_to_hex(self.color),
            selected: self.segment.selected,
            locked: self.segment.locked,
        }
    }
}

/// Wire-format snapshot of a region, also the event payload for region
/// lifecycle events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub id: RegionId,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "default_color_hex")]
    pub color: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub locked: bool,
}

fn default_color_hex() -> String {
    color_to_hex(DEFAULT_REGION_COLOR)
}

/// Format a color as `#rrggbbaa`, the inverse of the parser in `utils::color`.
pub fn color_to_hex(color: RgbaColor) -> String {
    color.to_hex()
}

/// Options accepted by `add_region` / `update_region`. Absent fields keep
/// their current value; unrecognized fields in serialized input are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RegionOptions {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub labels: Option<Vec<String>>,
    pub color: Option<String>,
    pub selected: Option<bool>,
    pub locked: Option<bool>,
    pub updateable: Option<bool>,
    pub deleteable: Option<bool>,
    pub visible: Option<bool>,
    pub show_in_timeline: Option<bool>,
}

impl RegionOptions {
    /// Options reproducing a snapshot, used for round-tripping exports.
    pub fn from_snapshot(snapshot: &RegionSnapshot) -> Self {
        Self {
            start: Some(snapshot.start),
            end: Some(snapshot.end),
            labels: Some(snapshot.labels.clone()),
            color: Some(snapshot.color.clone()),
            selected: Some(snapshot.selected),
            locked: Some(snapshot.locked),
            ..Self::default()
        }
    }

    pub(crate) fn resolved_color(&self, fallback: RgbaColor) -> RgbaColor {
        self.color
            .as_deref()
            .map(|value| parse_rgba_or(value, fallback))
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_serde() {
        let region = Region::new(
            Segment::new(1.5, 4.0),
            vec!["speech".to_string()],
            RgbaColor::opaque(200, 40, 40),
        );
        let json = serde_json::to_string(&region.snapshot()).expect("serialize");
        let back: RegionSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, region.snapshot());
        assert_eq!(back.color, "#c82828ff");
    }

    #[test]
    fn snapshot_ignores_unknown_fields() {
        let json = r#"{"id":"4a3d8b80-111f-4dbb-9aee-9f891f7ced59","start":1.0,"end":2.0,"bogus":true}"#;
        let snapshot: RegionSnapshot = serde_json::from_str(json).expect("deserialize");
        assert_eq!(snapshot.start, 1.0);
        assert_eq!(snapshot.labels, Vec::<String>::new());
    }

    #[test]
    fn hex_format_inverts_parser() {
        let color = RgbaColor::new(10, 200, 30, 128);
        let parsed = crate::utils::color::parse_rgba(&color_to_hex(color)).expect("parse");
        assert_eq!(parsed, color);
    }

    #[test]
    fn translucent_color_round_trips_through_snapshot() {
        let mut region = Region::new(Segment::new(0.0, 1.0), Vec::new(), DEFAULT_REGION_COLOR);
        let mut options = RegionOptions::default();
        options.color = Some("#aa000080".to_string());
        region.color = options.resolved_color(DEFAULT_REGION_COLOR);
        assert_eq!(region.snapshot().color, "#aa000080");
    }

    #[test]
    fn body_color_brightens_when_selected() {
        let mut region = Region::new(Segment::new(0.0, 1.0), Vec::new(), DEFAULT_REGION_COLOR);
        let idle = region.body_color();
        region.segment.selected = true;
        assert!(region.body_color().a() > idle.a());
    }
}
