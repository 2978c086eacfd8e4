//! Interactive time-range annotations over the waveform.
//!
//! The collection owns every segment/region, resolves pointer input into
//! hover/drag/draw state, and paints region bodies into a shared layer group.
//! Overlap between regions is unconstrained.

mod region;
mod segment;

use std::sync::Arc;

use tracing::debug;

use crate::events::{DestroyFlag, EventHub, WaveformEvent};
use crate::layers::{LayerGroup, LayerOptions};
use crate::utils::color::RgbaColor;
use crate::visualizer::ViewContext;

pub use region::{
    DEFAULT_REGION_COLOR, Region, RegionOptions, RegionSnapshot, color_to_hex,
};
pub use segment::{RegionId, Segment};

/// Pixel width of the grab zone at each segment boundary.
const EDGE_GRAB_PX: f32 = 5.0;
/// Minimum pointer travel before a draw gesture materializes a segment.
const DRAW_THRESHOLD_PX: f32 = 2.0;
/// Device-pixel width of the boundary handles.
const HANDLE_WIDTH_PX: u32 = 2;
/// Height of the label chip drawn at the top of labeled regions.
const LABEL_CHIP_PX: u32 = 5;

/// Where a pointer landed within a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HitZone {
    Body,
    LeftEdge,
    RightEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DragKind {
    Moving,
    ResizingLeft,
    ResizingRight,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum DragState {
    Idle,
    Dragging {
        id: RegionId,
        kind: DragKind,
        grab_time: f64,
        original: (f64, f64),
        moved: bool,
    },
    Drawing {
        anchor_time: f64,
        origin_x: f32,
        id: Option<RegionId>,
    },
}

/// The region collection: storage, hit-testing, and gesture resolution.
pub struct Regions {
    hub: Arc<EventHub<WaveformEvent>>,
    items: Vec<Region>,
    group: LayerGroup,
    drag: DragState,
    hovered: Option<RegionId>,
    locked: bool,
    drawable: bool,
    default_color: RgbaColor,
    destroyed: DestroyFlag,
}

impl Regions {
    pub fn new(hub: Arc<EventHub<WaveformEvent>>, default_color: RgbaColor) -> Self {
        Self {
            hub,
            items: Vec::new(),
            group: LayerGroup::new("regions", LayerOptions::default()),
            drag: DragState::Idle,
            hovered: None,
            locked: false,
            drawable: true,
            default_color,
            destroyed: DestroyFlag::new(),
        }
    }

    /// The shared layer group regions paint into.
    pub fn layer_group(&self) -> &LayerGroup {
        &self.group
    }

    pub fn layer_group_mut(&mut self) -> &mut LayerGroup {
        &mut self.group
    }

    /// Enable or disable creation-by-drag.
    pub fn set_drawable(&mut self, drawable: bool) {
        self.drawable = drawable;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.items.iter().find(|region| region.id() == id)
    }

    fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.items.iter_mut().find(|region| region.id() == id)
    }

    /// Snapshots of every region in render order.
    pub fn snapshots(&self) -> Vec<RegionSnapshot> {
        self.items.iter().map(Region::snapshot).collect()
    }

    /// Add a region programmatically.
    ///
    /// Negative endpoints panic (caller bug); missing endpoints default to 0.
    pub fn add(&mut self, options: &RegionOptions) -> Option<RegionSnapshot> {
        if self.destroyed.is_destroyed() {
            return None;
        }
        let start = options.start.unwrap_or(0.0);
        let end = options.end.unwrap_or(start);
        let mut segment = Segment::new(start, end);
        segment.selected = options.selected.unwrap_or(false);
        segment.locked = options.locked.unwrap_or(false);
        segment.updateable = options.updateable.unwrap_or(true);
        segment.deleteable = options.deleteable.unwrap_or(true);
        segment.visible = options.visible.unwrap_or(true);
        segment.show_in_timeline = options.show_in_timeline.unwrap_or(false);
        segment.external = true;
        let color = options.resolved_color(self.default_color);
        let labels = options.labels.clone().unwrap_or_default();

        let mut region = Region::new(segment, labels, color);
        region.layer = Some(self.group.add_layer(self.items.len() as i32));
        let snapshot = region.snapshot();
        self.items.push(region);
        self.hub.emit(&WaveformEvent::RegionCreated(snapshot.clone()));
        Some(snapshot)
    }

    /// Merge the provided fields into an existing region.
    ///
    /// Position changes are rejected while `updateable` is false; other fields
    /// still merge. Returns the updated snapshot.
    pub fn update(&mut self, id: RegionId, options: &RegionOptions) -> Option<RegionSnapshot> {
        if self.destroyed.is_destroyed() {
            return None;
        }
        let default_color = self.default_color;
        let region = self.get_mut(id)?;
        if region.segment.updateable {
            let start = options.start.unwrap_or(region.start());
            let end = options.end.unwrap_or(region.end());
            region.segment_mut().set_bounds(start, end);
        } else if options.start.is_some() || options.end.is_some() {
            debug!("ignoring position update for non-updateable region {id:?}");
        }
        if let Some(labels) = options.labels.clone() {
            region.labels = labels;
        }
        if options.color.is_some() {
            region.color = options.resolved_color(default_color);
        }
        if let Some(selected) = options.selected {
            region.segment_mut().selected = selected;
        }
        if let Some(locked) = options.locked {
            region.segment_mut().locked = locked;
        }
        if let Some(updateable) = options.updateable {
            region.segment_mut().updateable = updateable;
        }
        if let Some(deleteable) = options.deleteable {
            region.segment_mut().deleteable = deleteable;
        }
        if let Some(visible) = options.visible {
            region.segment_mut().visible = visible;
        }
        if let Some(show) = options.show_in_timeline {
            region.segment_mut().show_in_timeline = show;
        }
        let snapshot = region.snapshot();
        self.hub.emit(&WaveformEvent::RegionUpdated(snapshot.clone()));
        Some(snapshot)
    }

    /// Remove a region. Requires `deleteable` unless `silent` teardown is
    /// requested; listeners are notified before rendering resources detach.
    pub fn remove(&mut self, id: RegionId, silent: bool) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        let Some(position) = self.items.iter().position(|region| region.id() == id) else {
            return false;
        };
        if !silent && !self.items[position].segment().deleteable {
            debug!("refusing to remove non-deleteable region {id:?}");
            return false;
        }
        if !silent {
            self.hub.emit(&WaveformEvent::RegionRemoved(id));
        }
        let region = self.items.remove(position);
        if let Some(layer) = region.layer {
            self.group.remove_layer(layer);
        }
        if self.hovered == Some(id) {
            self.hovered = None;
        }
        true
    }

    /// Move a region to the end of the render list.
    pub fn bring_to_front(&mut self, id: RegionId) {
        let Some(position) = self.items.iter().position(|region| region.id() == id) else {
            return;
        };
        let region = self.items.remove(position);
        if let Some(layer) = region.layer {
            self.group.bring_to_front(layer);
        }
        self.items.push(region);
    }

    /// Suppress seek-on-click while a gesture resolves.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Union `[min(starts), max(ends)]` of the currently selected regions.
    pub fn selected_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for region in &self.items {
            if !region.segment().selected {
                continue;
            }
            range = Some(match range {
                None => (region.start(), region.end()),
                Some((start, end)) => (start.min(region.start()), end.max(region.end())),
            });
        }
        range
    }

    pub fn deselect_all(&mut self) {
        for region in &mut self.items {
            region.segment_mut().selected = false;
        }
    }

    /// Last region in list order containing the pointer, with its hit zone.
    fn find_at(&self, x: f32, y: f32, view: &ViewContext) -> Option<(RegionId, HitZone)> {
        let (band_top, band_bottom) = view.waveform_band();
        if y < band_top || y > band_bottom {
            return None;
        }
        // Last matching in list wins so overlapping regions resolve to the
        // most recently raised one.
        for region in self.items.iter().rev() {
            if !region.segment().visible {
                continue;
            }
            let x_start = view.time_to_x(region.start());
            let x_end = view.time_to_x(region.end());
            if x < x_start || x > x_end {
                continue;
            }
            let zone = if x - x_start <= EDGE_GRAB_PX {
                HitZone::LeftEdge
            } else if x_end - x <= EDGE_GRAB_PX {
                HitZone::RightEdge
            } else {
                HitZone::Body
            };
            return Some((region.id(), zone));
        }
        None
    }

    /// Pointer press. Returns true when the press begins a region gesture and
    /// must not be interpreted as a seek.
    pub fn handle_pointer_down(&mut self, x: f32, y: f32, view: &ViewContext) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        let (band_top, band_bottom) = view.waveform_band();
        if y < band_top || y > band_bottom {
            return false;
        }
        if let Some((id, zone)) = self.find_at(x, y, view) {
            let Some(region) = self.get(id) else {
                return false;
            };
            if region.segment().locked || !region.segment().updateable {
                // A locked region cannot start a gesture; the press falls
                // through to a plain seek.
                return false;
            }
            let kind = match zone {
                HitZone::Body => DragKind::Moving,
                HitZone::LeftEdge => DragKind::ResizingLeft,
                HitZone::RightEdge => DragKind::ResizingRight,
            };
            self.drag = DragState::Dragging {
                id,
                kind,
                grab_time: view.x_to_time(x),
                original: (region.start(), region.end()),
                moved: false,
            };
            self.lock();
            return true;
        }
        if self.drawable {
            self.drag = DragState::Drawing {
                anchor_time: view.x_to_time(x).max(0.0),
                origin_x: x,
                id: None,
            };
        }
        false
    }

    /// Pointer move: hover resolution when idle, gesture update otherwise.
    pub fn handle_pointer_move(&mut self, x: f32, y: f32, view: &ViewContext) {
        if self.destroyed.is_destroyed() {
            return;
        }
        match self.drag {
            DragState::Idle => {
                let hovered = self.find_at(x, y, view).map(|(id, _)| id);
                if hovered != self.hovered {
                    if let Some(previous) = self.hovered.and_then(|id| self.get_mut(id)) {
                        previous.segment_mut().highlighted = false;
                    }
                    if let Some(current) = hovered.and_then(|id| self.get_mut(id)) {
                        current.segment_mut().highlighted = true;
                    }
                    self.hovered = hovered;
                }
            }
            DragState::Dragging {
                id,
                kind,
                grab_time,
                original,
                ..
            } => {
                let time = view.x_to_time(x);
                let delta = time - grab_time;
                let duration = view.duration;
                let Some(region) = self.get_mut(id) else {
                    self.drag = DragState::Idle;
                    return;
                };
                let (orig_start, orig_end) = original;
                match kind {
                    DragKind::Moving => {
                        let segment = region.segment_mut();
                        segment.set_bounds(orig_start, orig_end);
                        segment.translate(delta, Some(duration));
                    }
                    DragKind::ResizingLeft => {
                        // Right boundary frozen.
                        let new_start = (orig_start + delta).clamp(0.0, duration);
                        region.segment_mut().set_bounds(new_start, orig_end);
                    }
                    DragKind::ResizingRight => {
                        // Left boundary frozen.
                        let new_end = (orig_end + delta).clamp(0.0, duration);
                        region.segment_mut().set_bounds(orig_start, new_end);
                    }
                }
                let snapshot = region.snapshot();
                self.drag = DragState::Dragging {
                    id,
                    kind,
                    grab_time,
                    original,
                    moved: true,
                };
                self.hub.emit(&WaveformEvent::RegionUpdated(snapshot));
            }
            DragState::Drawing {
                anchor_time,
                origin_x,
                id,
            } => {
                let time = view.x_to_time(x).clamp(0.0, view.duration);
                match id {
                    None => {
                        if (x - origin_x).abs() <= DRAW_THRESHOLD_PX {
                            return;
                        }
                        let mut segment = Segment::new(anchor_time.min(time), anchor_time.max(time));
                        segment.selected = false;
                        let mut region =
                            Region::new(segment, Vec::new(), self.default_color);
                        region.layer = Some(self.group.add_layer(self.items.len() as i32));
                        let created = region.id();
                        let snapshot = region.snapshot();
                        self.items.push(region);
                        self.drag = DragState::Drawing {
                            anchor_time,
                            origin_x,
                            id: Some(created),
                        };
                        // A region being drawn suppresses seeking until the
                        // gesture completes.
                        self.lock();
                        self.hub.emit(&WaveformEvent::RegionCreated(snapshot));
                    }
                    Some(region_id) => {
                        let Some(region) = self.get_mut(region_id) else {
                            self.drag = DragState::Idle;
                            return;
                        };
                        region
                            .segment_mut()
                            .set_bounds(anchor_time.min(time), anchor_time.max(time));
                        let snapshot = region.snapshot();
                        self.hub.emit(&WaveformEvent::RegionUpdated(snapshot));
                    }
                }
            }
        }
    }

    /// Pointer release. Returns true when the release completed a gesture and
    /// must not be interpreted as a seek.
    pub fn handle_pointer_up(&mut self, _x: f32, _y: f32, _view: &ViewContext) -> bool {
        if self.destroyed.is_destroyed() {
            return false;
        }
        let state = self.drag;
        self.drag = DragState::Idle;
        match state {
            DragState::Idle => false,
            DragState::Dragging { id, moved, .. } => {
                self.unlock();
                if moved {
                    if let Some(region) = self.get(id) {
                        let snapshot = region.snapshot();
                        self.hub.emit(&WaveformEvent::RegionUpdatedEnd(snapshot));
                    }
                    true
                } else {
                    // A press-release without travel toggles selection.
                    if let Some(region) = self.get_mut(id) {
                        let segment = region.segment_mut();
                        segment.selected = !segment.selected;
                        let snapshot = region.snapshot();
                        self.hub.emit(&WaveformEvent::RegionSelected(snapshot));
                    }
                    true
                }
            }
            DragState::Drawing { id, .. } => {
                self.unlock();
                let Some(id) = id else {
                    // Click without drag: no segment materialized.
                    return false;
                };
                let zero_width = self
                    .get(id)
                    .map(|region| region.segment().duration() <= f64::EPSILON)
                    .unwrap_or(true);
                if zero_width {
                    self.remove(id, true);
                    return true;
                }
                if let Some(region) = self.get(id) {
                    let snapshot = region.snapshot();
                    self.hub.emit(&WaveformEvent::RegionUpdatedEnd(snapshot));
                }
                true
            }
        }
    }

    /// Paint every visible region into the shared group surface.
    pub fn render(&mut self, view: &ViewContext) {
        self.group.clear();
        let ratio = self.group.base().pixel_ratio();
        let (band_top, band_bottom) = view.waveform_band();
        let top = (band_top * ratio).round() as i32;
        let band_height = (((band_bottom - band_top).max(0.0)) * ratio).round() as u32;
        let order = self.group.ordered_visible();
        for layer_id in order {
            let Some(region) = self
                .items
                .iter()
                .find(|region| region.layer == Some(layer_id))
            else {
                continue;
            };
            if !region.segment().visible {
                continue;
            }
            let x_start = (view.time_to_x(region.start()) * ratio).round() as i32;
            let x_end = (view.time_to_x(region.end()) * ratio).round() as i32;
            if x_end < 0 || x_start > self.group.base().width() as i32 {
                continue;
            }
            let width = (x_end - x_start).max(1) as u32;
            let body = region.body_color();
            let handle = region.handle_color();
            let labeled = !region.labels.is_empty();
            let highlighted = region.segment().highlighted;
            let surface = self.group.base_mut();
            surface.fill_rect(x_start, top, width, band_height, body);
            surface.draw_vline(
                x_start,
                top,
                top + band_height.saturating_sub(1) as i32,
                HANDLE_WIDTH_PX,
                handle,
            );
            surface.draw_vline(
                x_end,
                top,
                top + band_height.saturating_sub(1) as i32,
                HANDLE_WIDTH_PX,
                handle,
            );
            if labeled {
                surface.fill_rect(x_start, top, width, LABEL_CHIP_PX, handle);
            }
            if highlighted {
                surface.draw_hline(top, x_start, x_end, 1, handle);
                surface.draw_hline(
                    top + band_height.saturating_sub(1) as i32,
                    x_start,
                    x_end,
                    1,
                    handle,
                );
            }
        }
    }

    /// Notify listeners and detach rendering resources for every region.
    pub fn destroy(&mut self) {
        if !self.destroyed.destroy() {
            return;
        }
        let ids: Vec<RegionId> = self.items.iter().map(Region::id).collect();
        for id in ids {
            self.hub.emit(&WaveformEvent::RegionRemoved(id));
        }
        self.items.clear();
    }
}
