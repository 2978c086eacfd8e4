//! Audio waveform engine: decode, render, play, and annotate audio behind a
//! single [`waveform::Waveform`] facade.

/// Chunked audio decoding with a pooled channel splitter.
pub mod decoder;
/// The shared event hub and the unified event set.
pub mod events;
/// Pixel layers and z-ordered layer groups.
pub mod layers;
/// Media fetching: URLs, files, and in-memory bytes.
pub mod loader;
/// Tracing setup.
pub mod logging;
/// Overlay widgets: cursor, playhead, timeline, tooltip.
pub mod overlays;
/// Playback state machine and its two backends.
pub mod player;
/// Annotated time regions with pointer gestures.
pub mod regions;
/// Shared color and math helpers.
pub mod utils;
/// Waveform rendering and compositing.
pub mod visualizer;
/// The public facade.
pub mod waveform;

pub use events::{SubscriptionId, WaveformEvent};
pub use loader::MediaSource;
pub use regions::{RegionId, RegionOptions, RegionSnapshot};
pub use waveform::{Waveform, WaveformError, WaveformOptions};
