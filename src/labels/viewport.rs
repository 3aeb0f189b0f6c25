use std::time::Duration;

use egui::{Pos2, Vec2};

use super::feature::{Feature, FeatureId};
use crate::map::map_tile::Coordinate;

/// Layer holding the interactive point markers.
pub const MARKER_LAYER: &str = "poi-markers";
/// Always-on small text labels shown on coarse-pointer devices.
pub const MOBILE_LABEL_LAYER: &str = "poi-mobile-labels";

/// Geographic to canvas-local projection of the current camera.
pub trait Projection {
    /// Canvas-local position in points, origin at the top-left corner.
    fn project(&self, position: Coordinate) -> Pos2;
    fn center(&self) -> Coordinate;
    fn canvas_size(&self) -> Vec2;
}

/// What the engine needs from the map that draws the markers.
pub trait ViewportRenderer: Projection {
    /// `false` until the named layer (and its source) exists.
    fn has_layer(&self, layer: &str) -> bool;
    /// Features currently drawn for `layer`. Ids may repeat.
    fn query_rendered_features(&self, layer: &str) -> Vec<Feature>;
    fn zoom(&self) -> f32;
    fn set_hover(&mut self, id: FeatureId, hover: bool);
    fn show_tooltip(&mut self, feature: &Feature, at: Coordinate);
    fn hide_tooltip(&mut self);
    fn set_layer_visible(&mut self, layer: &str, visible: bool);
    fn fly_to(&mut self, options: FlyTo);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyTo {
    pub center: Coordinate,
    pub zoom: f32,
    pub duration: Duration,
}

/// Renderer and input events the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEvent {
    DragStart,
    ZoomStart,
    RotateStart,
    PitchStart,
    Wheel,
    PointerDown,
    TouchStart,
    Move,
    Zoom,
    Rotate,
    Pitch,
    Resize,
    MoveEnd,
    ZoomEnd,
    Idle,
}

impl MapEvent {
    /// The user started doing something with the map.
    pub fn is_interaction(self) -> bool {
        matches!(
            self,
            MapEvent::DragStart
                | MapEvent::ZoomStart
                | MapEvent::RotateStart
                | MapEvent::PitchStart
                | MapEvent::Wheel
                | MapEvent::PointerDown
                | MapEvent::TouchStart
        )
    }

    /// The camera came to rest.
    pub fn is_settle(self) -> bool {
        matches!(self, MapEvent::MoveEnd | MapEvent::ZoomEnd | MapEvent::Idle)
    }
}
