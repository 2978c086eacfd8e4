//! Secondary visual/interaction overlays layered on top of the visualizer.

mod cursor;
mod playhead;
mod timeline;
mod tooltip;

pub use cursor::{Cursor, CursorOptions};
pub use playhead::{Playhead, PlayheadOptions};
pub use timeline::{Timeline, TimelineOptions, tick_interval};
pub use tooltip::{Tooltip, format_timecode};
