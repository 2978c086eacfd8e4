//! Drawable surfaces and compositing.
//!
//! A [`Layer`] is one RGBA surface plus its compositing parameters. Layers are
//! kept off-screen while the engine draws and are composited into a single
//! visible surface by ascending z-index. A [`LayerGroup`] shares one physical
//! surface among several logical layers so per-region drawing does not
//! allocate a surface per region.

mod group;
mod layer;

pub use group::{LayerGroup, LogicalLayerId};
pub use layer::{CompositeOperation, Layer, LayerOptions};
