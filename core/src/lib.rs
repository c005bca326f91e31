//! Overlay core for the detection front-end.
//!
//! Validates recognition results at the service boundary, maps playback time
//! onto sampled result frames, and composites labeled boxes over media
//! frames on a pixel-exact drawing surface.

pub mod detection;
pub mod playback;
pub mod prelude;
pub mod render;
pub mod session;
pub mod telemetry;

pub use prelude::{OverlayError, OverlayResult};
