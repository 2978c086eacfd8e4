//! Pure helpers shared across the engine: color parsing/blending and numeric utilities.

pub mod color;
pub mod math;
