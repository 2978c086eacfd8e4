use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a segment or region, assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(Uuid);

impl RegionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A time interval on the waveform with interaction flags.
///
/// `start <= end` holds after every mutation: inverted inputs are swapped
/// rather than rejected. Negative endpoints at construction are a caller bug
/// and panic.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    id: RegionId,
    start: f64,
    end: f64,
    pub selected: bool,
    pub highlighted: bool,
    pub locked: bool,
    pub updateable: bool,
    pub deleteable: bool,
    pub visible: bool,
    pub show_in_timeline: bool,
    /// Supplied by the surrounding editor rather than drawn by the user.
    pub external: bool,
}

impl Segment {
    /// Create a segment over `[start, end]` seconds.
    ///
    /// Panics if either endpoint is negative; that indicates a caller bug, not
    /// a runtime condition.
    pub fn new(start: f64, end: f64) -> Self {
        assert!(
            start >= 0.0 && end >= 0.0,
            "segment endpoints must be non-negative (got {start}, {end})"
        );
        let (start, end) = ordered(start, end);
        Self {
            id: RegionId::new(),
            start,
            end,
            selected: false,
            highlighted: false,
            locked: false,
            updateable: true,
            deleteable: true,
            visible: true,
            show_in_timeline: false,
            external: false,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Replace both endpoints, swapping when inverted and clamping at zero.
    pub fn set_bounds(&mut self, start: f64, end: f64) {
        let (start, end) = ordered(start.max(0.0), end.max(0.0));
        self.start = start;
        self.end = end;
    }

    /// Translate the whole interval, clamping so `start` stays non-negative
    /// and `end` stays within `max_end` when provided.
    pub fn translate(&mut self, delta: f64, max_end: Option<f64>) {
        let length = self.duration();
        let mut start = self.start + delta;
        if let Some(max_end) = max_end {
            start = start.min((max_end - length).max(0.0));
        }
        start = start.max(0.0);
        self.start = start;
        self.end = start + length;
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
