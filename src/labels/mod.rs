//! Label declutter engine.
//!
//! Picks which point features get a readable label, places those labels in
//! screen space without overlap, and drives re-planning from camera events
//! at most once per frame. An idle preview hovers random markers until the
//! user first touches the map.

pub mod candidates;
pub mod config;
pub mod controller;
pub mod feature;
pub mod hover;
pub mod idle_preview;
pub mod placement;
pub mod planner;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use candidates::{unique_visible, visible_count};
pub use config::LabelConfig;
pub use controller::{should_show_mobile_labels, DeclutterPhase, LabelController, RecenterTarget};
pub use feature::{Feature, FeatureId, HoursState};
pub use planner::{plan, PlacementPlan, PlacedLabel};
pub use viewport::{MapEvent, Projection, ViewportRenderer};
