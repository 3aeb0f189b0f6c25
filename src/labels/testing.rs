//! Test doubles for the engine: a linear projection and a renderer that records calls.

use std::collections::{BTreeSet, HashMap};

use egui::{pos2, vec2, Pos2, Vec2};

use super::feature::{Feature, FeatureId};
use super::viewport::{FlyTo, Projection, ViewportRenderer, MARKER_LAYER, MOBILE_LABEL_LAYER};
use crate::map::map_tile::Coordinate;

/// Flat projection: a fixed number of pixels per degree on both axes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearProjection {
    pub center: Coordinate,
    pub canvas: Vec2,
    pub px_per_degree: f64,
}

impl Default for LinearProjection {
    fn default() -> Self {
        Self {
            center: Coordinate::new(-121.0, 39.2),
            canvas: vec2(1200.0, 800.0),
            px_per_degree: 10_000.0,
        }
    }
}

impl LinearProjection {
    pub fn unproject(&self, screen: Pos2) -> Coordinate {
        let dx = (screen.x - self.canvas.x / 2.0) as f64 / self.px_per_degree;
        let dy = (screen.y - self.canvas.y / 2.0) as f64 / self.px_per_degree;
        Coordinate::new(self.center.longitude() + dx, self.center.latitude() - dy)
    }
}

impl Projection for LinearProjection {
    fn project(&self, position: Coordinate) -> Pos2 {
        let dx = (position.longitude() - self.center.longitude()) * self.px_per_degree;
        let dy = (position.latitude() - self.center.latitude()) * self.px_per_degree;
        pos2(self.canvas.x / 2.0 + dx as f32, self.canvas.y / 2.0 - dy as f32)
    }

    fn center(&self) -> Coordinate {
        self.center
    }

    fn canvas_size(&self) -> Vec2 {
        self.canvas
    }
}

/// A named feature drawn at screen position `(x, y)` under the default projection.
pub(crate) fn poi(id: FeatureId, x: f32, y: f32) -> Feature {
    let position = LinearProjection::default().unproject(pos2(x, y));
    Feature::new(id, position, format!("Venue {id}"), "Galleries")
}

/// `count` features on a square grid around the canvas centre, ids `0..count`.
pub(crate) fn grid_features(count: usize, spacing: f32) -> Vec<Feature> {
    let canvas = LinearProjection::default().canvas;
    let cols = (count as f32).sqrt().ceil().max(1.0) as usize;
    let rows = count.div_ceil(cols).max(1);
    (0..count)
        .map(|i| {
            let col = (i % cols) as f32 - (cols - 1) as f32 / 2.0;
            let row = (i / cols) as f32 - (rows - 1) as f32 / 2.0;
            poi(i as FeatureId, canvas.x / 2.0 + col * spacing, canvas.y / 2.0 + row * spacing)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TooltipCall {
    Show(FeatureId),
    Hide,
}

/// Renderer that keeps feature state in memory and records every side effect.
#[derive(Debug, Default)]
pub(crate) struct FakeRenderer {
    pub projection: LinearProjection,
    pub ready: bool,
    pub coarse_pointer: bool,
    pub zoom: f32,
    pub rendered: Vec<Feature>,
    pub hovered: BTreeSet<FeatureId>,
    pub hover_calls: Vec<(FeatureId, bool)>,
    pub most_hovered_at_once: usize,
    pub tooltip: Option<FeatureId>,
    pub tooltip_calls: Vec<TooltipCall>,
    pub layer_visibility: HashMap<String, bool>,
    pub flights: Vec<FlyTo>,
}

impl FakeRenderer {
    pub fn with_features(rendered: Vec<Feature>) -> Self {
        Self {
            ready: true,
            zoom: 12.0,
            rendered,
            ..Self::default()
        }
    }

    pub fn mobile_labels_visible(&self) -> Option<bool> {
        self.layer_visibility.get(MOBILE_LABEL_LAYER).copied()
    }
}

impl Projection for FakeRenderer {
    fn project(&self, position: Coordinate) -> Pos2 {
        self.projection.project(position)
    }

    fn center(&self) -> Coordinate {
        self.projection.center
    }

    fn canvas_size(&self) -> Vec2 {
        self.projection.canvas
    }
}

impl ViewportRenderer for FakeRenderer {
    fn has_layer(&self, layer: &str) -> bool {
        self.ready && (layer == MARKER_LAYER || (layer == MOBILE_LABEL_LAYER && self.coarse_pointer))
    }

    fn query_rendered_features(&self, layer: &str) -> Vec<Feature> {
        if self.has_layer(layer) {
            self.rendered.clone()
        } else {
            Vec::new()
        }
    }

    fn zoom(&self) -> f32 {
        self.zoom
    }

    fn set_hover(&mut self, id: FeatureId, hover: bool) {
        self.hover_calls.push((id, hover));
        if hover {
            self.hovered.insert(id);
        } else {
            self.hovered.remove(&id);
        }
        self.most_hovered_at_once = self.most_hovered_at_once.max(self.hovered.len());
    }

    fn show_tooltip(&mut self, feature: &Feature, _at: Coordinate) {
        self.tooltip = Some(feature.id);
        self.tooltip_calls.push(TooltipCall::Show(feature.id));
    }

    fn hide_tooltip(&mut self) {
        self.tooltip = None;
        self.tooltip_calls.push(TooltipCall::Hide);
    }

    fn set_layer_visible(&mut self, layer: &str, visible: bool) {
        self.layer_visibility.insert(layer.to_string(), visible);
    }

    fn fly_to(&mut self, options: FlyTo) {
        self.flights.push(options);
    }
}
