use std::collections::HashSet;

use egui::epaint::{Color32, Pos2, Rect, Stroke};
use egui::{pos2, vec2, Align2, FontId, Painter, Response, Sense, Ui, Vec2};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::map_tile::{Coordinate, MapTile, TileKey, TILE_SIZE};
use super::poi_layer::{PoiLayer, TILE_BUFFER_PX};
use crate::labels::candidates::unique_visible;
use crate::labels::feature::{Feature, FeatureId, HoursState};
use crate::labels::planner::PlacedLabel;
use crate::labels::viewport::{FlyTo, MapEvent, Projection, ViewportRenderer, MARKER_LAYER, MOBILE_LABEL_LAYER};

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 19.0;

const MARKER_RADIUS: f32 = 6.0;
const HOVER_RADIUS: f32 = 9.0;
const HIT_SLOP: f32 = 4.0;

const BACKGROUND: Color32 = Color32::from_rgb(24, 26, 30);
const PLACEHOLDER: Color32 = Color32::from_rgb(36, 38, 42);
const CARD_FILL: Color32 = Color32::from_rgba_premultiplied(22, 22, 26, 230);
const CARD_HOVER_FILL: Color32 = Color32::from_rgb(52, 50, 46);
const LEADER: Color32 = Color32::from_gray(140);

/// Camera. Persisted in egui memory between runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapState {
    pub center: Coordinate,
    pub zoom: f32,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            center: Coordinate::new(-121.02, 39.24),
            zoom: 11.5,
        }
    }
}

impl MapState {
    pub fn load(ctx: &egui::Context, id: egui::Id) -> Self {
        ctx.data_mut(|d| d.get_persisted::<Self>(id).unwrap_or_default())
    }

    pub fn store(self, ctx: &egui::Context, id: egui::Id) {
        ctx.data_mut(|d| d.insert_persisted(id, self));
    }
}

#[derive(Debug, Clone, Copy)]
struct Flight {
    from: MapState,
    to: MapState,
    started: f64,
    duration: f64,
}

impl Flight {
    /// Camera at `time` and whether the flight has landed.
    fn at(&self, time: f64) -> (MapState, bool) {
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            ((time - self.started) / self.duration).clamp(0.0, 1.0)
        };
        let eased = 1.0 - (1.0 - t).powi(3);
        let (x0, y0) = self.from.center.to_world(0.0);
        let (x1, y1) = self.to.center.to_world(0.0);
        let state = MapState {
            center: Coordinate::from_world(x0 + (x1 - x0) * eased, y0 + (y1 - y0) * eased, 0.0),
            zoom: self.from.zoom + (self.to.zoom - self.from.zoom) * eased as f32,
        };
        (state, t >= 1.0)
    }
}

/// Change of the marker under the real pointer during one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerHover {
    Unchanged,
    Over(Feature),
    Left,
}

pub struct MapResponse {
    pub response: Response,
    pub events: Vec<MapEvent>,
    pub pointer_hover: PointerHover,
    pub clicked_marker: Option<Feature>,
    pub clicked_label: Option<FeatureId>,
}

/// Slippy map over raster tiles with a POI marker layer.
pub struct MapView {
    id: egui::Id,
    state: MapState,
    // Last allocated canvas, in screen points.
    canvas: Rect,
    layer: PoiLayer,
    coarse_pointer: bool,
    mobile_labels_visible: bool,
    hovered: HashSet<FeatureId>,
    tooltip: Option<(Feature, Coordinate)>,
    flight: Option<Flight>,
    time: f64,
    zooming: bool,
    pointer_over: Option<FeatureId>,
}

impl MapView {
    pub fn new(ctx: &egui::Context, id_source: impl std::hash::Hash, layer: PoiLayer, coarse_pointer: bool) -> Self {
        let id = egui::Id::new(id_source);
        let state = MapState::load(ctx, id);
        Self::with_state(id, state, layer, coarse_pointer)
    }

    fn with_state(id: egui::Id, state: MapState, layer: PoiLayer, coarse_pointer: bool) -> Self {
        Self {
            id,
            state,
            canvas: Rect::ZERO,
            layer,
            coarse_pointer,
            mobile_labels_visible: false,
            hovered: HashSet::new(),
            tooltip: None,
            flight: None,
            time: 0.0,
            zooming: false,
            pointer_over: None,
        }
    }

    pub fn layer(&self) -> &PoiLayer {
        &self.layer
    }

    pub fn set_open_only(&mut self, open_only: bool) {
        self.layer.set_open_only(open_only);
    }

    /// The marker layer exists once the canvas has been laid out.
    pub fn is_ready(&self) -> bool {
        self.canvas.is_positive() && !self.layer.is_empty()
    }

    pub fn is_animating(&self) -> bool {
        self.flight.is_some() || self.zooming
    }

    fn tile_zoom(&self) -> u32 {
        self.state.zoom.floor().clamp(0.0, MAX_ZOOM) as u32
    }

    /// Tiles covering the canvas at the current integer level, row by row.
    pub fn visible_tiles(&self) -> Vec<TileKey> {
        let z = self.tile_zoom();
        let scale = 2.0_f64.powf(self.state.zoom as f64 - z as f64);
        let (cx, cy) = self.state.center.to_world(z as f64);
        let half_w = self.canvas.width() as f64 / 2.0 / scale;
        let half_h = self.canvas.height() as f64 / 2.0 / scale;
        let max = (TileKey::tiles_per_axis(z) - 1) as f64;
        let index = |world: f64| (world / TILE_SIZE).floor().clamp(0.0, max) as u32;

        let mut tiles = Vec::new();
        for y in index(cy - half_h)..=index(cy + half_h) {
            for x in index(cx - half_w)..=index(cx + half_w) {
                tiles.push(TileKey::new(z, x, y));
            }
        }
        tiles
    }

    fn to_screen(&self, position: Coordinate) -> Pos2 {
        self.canvas.min + self.project(position).to_vec2()
    }

    fn pan_by(&mut self, delta: Vec2) {
        let zoom = self.state.zoom as f64;
        let (cx, cy) = self.state.center.to_world(zoom);
        self.state.center = Coordinate::from_world(cx - delta.x as f64, cy - delta.y as f64, zoom);
    }

    /// Lays out, handles input and paints one frame.
    pub fn show(
        &mut self,
        ui: &mut Ui,
        tiles: &mut LruCache<TileKey, MapTile>,
        missing: &mut Vec<TileKey>,
        overlay: &[PlacedLabel],
    ) -> MapResponse {
        let mut events = Vec::new();
        self.time = ui.input(|i| i.time);

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let was_ready = self.is_ready();
        if was_ready && rect.size() != self.canvas.size() {
            events.push(MapEvent::Resize);
        }
        self.canvas = rect;
        if !was_ready && self.is_ready() {
            events.push(MapEvent::Idle);
        }

        self.handle_input(ui, &response, &mut events);
        self.advance_flight(self.time, &mut events);
        self.state.store(ui.ctx(), self.id);

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, BACKGROUND);
        self.paint_tiles(&painter, ui.ctx(), tiles, missing);

        let markers = unique_visible(self.query_rendered_features(MARKER_LAYER));
        self.paint_markers(&painter, &markers);
        if self.coarse_pointer && self.mobile_labels_visible {
            self.paint_mobile_labels(&painter, &markers);
        }
        let clicked_label = self.paint_overlay(ui, &painter, overlay);
        self.paint_tooltip(&painter);

        let under = response
            .hover_pos()
            .and_then(|pointer| self.marker_at(&markers, pointer));
        let pointer_hover = match (&under, self.pointer_over) {
            (Some(feature), over) if over != Some(feature.id) => PointerHover::Over(feature.clone()),
            (None, Some(_)) => PointerHover::Left,
            _ => PointerHover::Unchanged,
        };
        self.pointer_over = under.as_ref().map(|feature| feature.id);
        let clicked_marker = if response.clicked() { under } else { None };

        MapResponse {
            response,
            events,
            pointer_hover,
            clicked_marker,
            clicked_label,
        }
    }

    fn handle_input(&mut self, ui: &Ui, response: &Response, events: &mut Vec<MapEvent>) {
        if response.hovered() && ui.input(|i| i.pointer.any_pressed()) {
            let touch = ui.input(|i| i.any_touches());
            events.push(if touch { MapEvent::TouchStart } else { MapEvent::PointerDown });
        }

        if response.drag_started() {
            self.flight = None;
            events.push(MapEvent::DragStart);
        }
        if response.dragged() {
            let delta = response.drag_delta();
            if delta != Vec2::ZERO {
                self.pan_by(delta);
                events.push(MapEvent::Move);
            }
        }
        if response.drag_stopped() {
            events.push(MapEvent::MoveEnd);
        }

        let mut zoom_step = 0.0;
        if response.hovered() {
            // Pinch, or ctrl + scroll
            let pinch = ui.input(|i| i.zoom_delta()) - 1.0;
            if pinch.abs() > f32::EPSILON {
                zoom_step = pinch.abs().min(1.0) * pinch.signum();
            } else {
                let scroll = ui.input(|i| i.smooth_scroll_delta.y);
                if scroll.abs() > f32::EPSILON {
                    zoom_step = (scroll / 10.0).tanh();
                    if !self.zooming {
                        events.push(MapEvent::Wheel);
                    }
                }
            }
        }

        if zoom_step != 0.0 {
            if !self.zooming {
                self.zooming = true;
                self.flight = None;
                events.push(MapEvent::ZoomStart);
            }
            self.state.zoom = (self.state.zoom + zoom_step).clamp(MIN_ZOOM, MAX_ZOOM);
            events.push(MapEvent::Zoom);
        } else if self.zooming {
            self.zooming = false;
            events.push(MapEvent::ZoomEnd);
        }
    }

    fn advance_flight(&mut self, time: f64, events: &mut Vec<MapEvent>) {
        let Some(flight) = self.flight else {
            return;
        };
        let (state, landed) = flight.at(time);
        let zoomed = state.zoom != self.state.zoom;
        self.state = state;
        events.push(MapEvent::Move);
        if zoomed {
            events.push(MapEvent::Zoom);
        }
        if landed {
            self.flight = None;
            events.push(MapEvent::MoveEnd);
            events.push(MapEvent::ZoomEnd);
        }
    }

    fn marker_at(&self, markers: &[Feature], pointer: Pos2) -> Option<Feature> {
        let reach = HOVER_RADIUS + HIT_SLOP;
        markers
            .iter()
            .filter_map(|feature| {
                let distance = self.to_screen(feature.point()?).distance(pointer);
                (distance <= reach).then_some((distance, feature))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, feature)| feature.clone())
    }

    fn paint_tiles(
        &self,
        painter: &Painter,
        ctx: &egui::Context,
        tiles: &mut LruCache<TileKey, MapTile>,
        missing: &mut Vec<TileKey>,
    ) {
        let z = self.tile_zoom();
        let scale = 2.0_f32.powf(self.state.zoom - z as f32);
        let (cx, cy) = self.state.center.to_world(z as f64);
        let origin = self.canvas.center();
        let to_screen = |x: f64, y: f64| origin + vec2((x - cx) as f32 * scale, (y - cy) as f32 * scale);
        let uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));

        for key in self.visible_tiles() {
            let (min_x, min_y, max_x, max_y) = key.world_bounds();
            let tile_rect = Rect::from_min_max(to_screen(min_x, min_y), to_screen(max_x, max_y));
            match tiles.get_mut(&key) {
                Some(tile) => {
                    let texture = tile.texture(ctx);
                    painter.image(texture.id(), tile_rect, uv, Color32::WHITE);
                }
                None => {
                    missing.push(key);
                    painter.rect_filled(tile_rect.shrink(0.5), 0.0, PLACEHOLDER);
                }
            }
        }
    }

    fn paint_markers(&self, painter: &Painter, markers: &[Feature]) {
        for feature in markers {
            let Some(point) = feature.point() else {
                continue;
            };
            let center = self.to_screen(point);
            let color = self.layer.color_for(&feature.category);
            if self.hovered.contains(&feature.id) {
                painter.circle(center, HOVER_RADIUS, color, Stroke::new(2.0, Color32::WHITE));
            } else {
                painter.circle(center, MARKER_RADIUS, color, Stroke::new(1.5, BACKGROUND));
            }
        }
    }

    fn paint_mobile_labels(&self, painter: &Painter, markers: &[Feature]) {
        for feature in markers {
            let (Some(point), Some(text)) = (feature.point(), feature.label_text()) else {
                continue;
            };
            painter.text(
                self.to_screen(point) + vec2(0.0, MARKER_RADIUS + 2.0),
                Align2::CENTER_TOP,
                text,
                FontId::proportional(11.0),
                Color32::from_gray(230),
            );
        }
    }

    /// Paints the declutter cards and returns the one clicked this frame.
    fn paint_overlay(&self, ui: &Ui, painter: &Painter, overlay: &[PlacedLabel]) -> Option<FeatureId> {
        let offset = self.canvas.min.to_vec2();
        let mut clicked = None;
        for label in overlay {
            let card = label.label_box.rect.translate(offset);
            let color = self.layer.color_for(&label.feature.category);
            if !label.slot.is_origin() {
                let anchor = label.anchor + offset;
                painter.line_segment([anchor, card.center_bottom()], Stroke::new(1.0, LEADER));
            }

            let response = ui.interact(card, self.id.with(("label", label.feature.id)), Sense::click());
            let lit = response.hovered() || self.hovered.contains(&label.feature.id);
            painter.rect(card, 6.0, if lit { CARD_HOVER_FILL } else { CARD_FILL }, Stroke::new(1.0, color));
            painter.circle_filled(pos2(card.left() + 11.0, card.center().y), 4.0, color);

            let text = label.feature.label_text().unwrap_or_default().to_owned();
            let galley = painter.layout_no_wrap(text, FontId::proportional(12.0), Color32::WHITE);
            let text_pos = pos2(card.left() + 19.0, card.center().y - galley.size().y / 2.0);
            painter
                .with_clip_rect(card.shrink(2.0))
                .galley(text_pos, galley, Color32::WHITE);

            if response.clicked() {
                clicked = Some(label.feature.id);
            }
            response.on_hover_cursor(egui::CursorIcon::PointingHand);
        }
        clicked
    }

    fn paint_tooltip(&self, painter: &Painter) {
        let Some((feature, at)) = &self.tooltip else {
            return;
        };
        let anchor = self.to_screen(*at);
        if !self.canvas.contains(anchor) {
            return;
        }

        let mut detail = feature.category.clone();
        if let Some(city) = &feature.city {
            detail.push_str(" · ");
            detail.push_str(city);
        }
        match feature.hours {
            HoursState::Open => detail.push_str(" · Open now"),
            HoursState::Closed => detail.push_str(" · Closed"),
            HoursState::Unknown => {}
        }

        let title = painter.layout_no_wrap(feature.name.clone(), FontId::proportional(14.0), Color32::WHITE);
        let detail = painter.layout_no_wrap(detail, FontId::proportional(11.0), Color32::from_gray(200));
        let (title_size, detail_size) = (title.size(), detail.size());
        let size = vec2(title_size.x.max(detail_size.x) + 16.0, title_size.y + detail_size.y + 14.0);
        let rect = Rect::from_center_size(anchor - vec2(0.0, HOVER_RADIUS + 8.0 + size.y / 2.0), size);

        let color = self.layer.color_for(&feature.category);
        painter.rect(rect, 6.0, CARD_FILL, Stroke::new(1.0, color));
        painter.galley(rect.min + vec2(8.0, 6.0), title, Color32::WHITE);
        painter.galley(rect.min + vec2(8.0, 8.0 + title_size.y), detail, Color32::from_gray(200));
    }
}

impl Projection for MapView {
    fn project(&self, position: Coordinate) -> Pos2 {
        let zoom = self.state.zoom as f64;
        let (cx, cy) = self.state.center.to_world(zoom);
        let (x, y) = position.to_world(zoom);
        let half = self.canvas.size() / 2.0;
        pos2((x - cx) as f32 + half.x, (y - cy) as f32 + half.y)
    }

    fn center(&self) -> Coordinate {
        self.state.center
    }

    fn canvas_size(&self) -> Vec2 {
        self.canvas.size()
    }
}

impl ViewportRenderer for MapView {
    fn has_layer(&self, layer: &str) -> bool {
        match layer {
            MARKER_LAYER => self.is_ready(),
            MOBILE_LABEL_LAYER => self.coarse_pointer && self.is_ready(),
            _ => false,
        }
    }

    /// Everything drawn on the canvas, tile by tile, so edge features repeat.
    fn query_rendered_features(&self, layer: &str) -> Vec<Feature> {
        if !self.has_layer(layer) {
            return Vec::new();
        }
        let canvas = Rect::from_min_size(Pos2::ZERO, self.canvas.size());
        let mut rendered = self.layer.render_tiles(&self.visible_tiles(), TILE_BUFFER_PX);
        rendered.retain(|feature| {
            feature
                .point()
                .is_some_and(|point| canvas.contains(self.project(point)))
        });
        rendered
    }

    fn zoom(&self) -> f32 {
        self.state.zoom
    }

    fn set_hover(&mut self, id: FeatureId, hover: bool) {
        if hover {
            self.hovered.insert(id);
        } else {
            self.hovered.remove(&id);
        }
    }

    fn show_tooltip(&mut self, feature: &Feature, at: Coordinate) {
        self.tooltip = Some((feature.clone(), at));
    }

    fn hide_tooltip(&mut self) {
        self.tooltip = None;
    }

    fn set_layer_visible(&mut self, layer: &str, visible: bool) {
        if layer == MOBILE_LABEL_LAYER {
            self.mobile_labels_visible = visible;
        }
    }

    fn fly_to(&mut self, options: FlyTo) {
        log::debug!(
            "flying to ({:.5}, {:.5}) z{:.1} over {:?}",
            options.center.longitude(),
            options.center.latitude(),
            options.zoom,
            options.duration
        );
        self.flight = Some(Flight {
            from: self.state,
            to: MapState {
                center: options.center,
                zoom: options.zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            },
            started: self.time,
            duration: options.duration.as_secs_f64(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;

    use super::*;
    use crate::labels::config::LabelConfig;
    use crate::labels::controller::LabelController;
    use crate::labels::idle_preview::XorShiftRng;
    use crate::map::poi_layer::PoiDataset;

    fn layer(points: &[(f64, f64)]) -> PoiLayer {
        let features = points
            .iter()
            .enumerate()
            .map(|(i, &(lon, lat))| Feature::new(i as FeatureId, Coordinate::new(lon, lat), format!("Stop {i}"), "Public Art"))
            .collect();
        PoiLayer::new(PoiDataset {
            categories: Default::default(),
            features,
        })
    }

    fn view(points: &[(f64, f64)], zoom: f32) -> MapView {
        let state = MapState {
            center: Coordinate::new(-121.02, 39.24),
            zoom,
        };
        let mut view = MapView::with_state(egui::Id::new("test_map"), state, layer(points), false);
        view.canvas = Rect::from_min_size(pos2(100.0, 50.0), vec2(1200.0, 800.0));
        view
    }

    #[test]
    fn camera_centre_projects_to_canvas_middle() {
        let view = view(&[(-121.02, 39.24)], 13.3);
        let middle = view.project(Coordinate::new(-121.02, 39.24));
        assert_relative_eq!(middle.x, 600.0, epsilon = 1e-3);
        assert_relative_eq!(middle.y, 400.0, epsilon = 1e-3);
        assert_eq!(view.to_screen(Coordinate::new(-121.02, 39.24)), pos2(700.0, 450.0));
    }

    #[test]
    fn visible_tiles_cover_the_canvas() {
        let view = view(&[], 12.0);
        let tiles = view.visible_tiles();
        assert!(tiles.iter().all(|tile| tile.z == 12));
        // 1200 x 800 points over 512 point tiles.
        let xs: HashSet<_> = tiles.iter().map(|t| t.x).collect();
        let ys: HashSet<_> = tiles.iter().map(|t| t.y).collect();
        assert!((3..=4).contains(&xs.len()));
        assert!((2..=3).contains(&ys.len()));
        assert!(tiles.contains(&TileKey::containing(&view.center(), 12)));
    }

    #[test]
    fn rendered_features_repeat_across_tiles_but_stay_on_canvas() {
        let probe = view(&[], 12.0);
        let (_, cy) = probe.center().to_world(12.0);
        let (min_x, ..) = TileKey::containing(&probe.center(), 12).world_bounds();
        let edge = Coordinate::from_world(min_x + 1.0, cy, 12.0);

        let view = view(&[(edge.longitude(), edge.latitude()), (-100.0, 45.0)], 12.0);
        let rendered = view.query_rendered_features(MARKER_LAYER);
        assert!(rendered.len() >= 2);
        assert!(rendered.iter().all(|feature| feature.id == 0));
        assert_eq!(unique_visible(rendered).len(), 1);
    }

    #[test]
    fn layers_wait_for_layout() {
        let mut view = view(&[(-121.02, 39.24)], 12.0);
        view.canvas = Rect::ZERO;
        assert!(!view.has_layer(MARKER_LAYER));
        assert!(view.query_rendered_features(MARKER_LAYER).is_empty());
        view.canvas = Rect::from_min_size(Pos2::ZERO, vec2(400.0, 300.0));
        assert!(view.has_layer(MARKER_LAYER));
        assert!(!view.has_layer(MOBILE_LABEL_LAYER));
        view.coarse_pointer = true;
        assert!(view.has_layer(MOBILE_LABEL_LAYER));
    }

    #[test]
    fn flights_ease_to_the_target_and_settle() {
        let mut view = view(&[], 12.0);
        view.time = 10.0;
        let target = Coordinate::new(-121.06, 39.22);
        view.fly_to(FlyTo {
            center: target,
            zoom: 14.0,
            duration: Duration::from_millis(500),
        });

        let mut events = Vec::new();
        view.advance_flight(10.25, &mut events);
        assert_eq!(events, [MapEvent::Move, MapEvent::Zoom]);
        assert!(view.zoom() > 12.0 && view.zoom() < 14.0);

        events.clear();
        view.advance_flight(11.0, &mut events);
        assert_eq!(events, [MapEvent::Move, MapEvent::Zoom, MapEvent::MoveEnd, MapEvent::ZoomEnd]);
        assert_relative_eq!(view.zoom(), 14.0);
        assert_relative_eq!(view.center().longitude(), target.longitude(), epsilon = 1e-9);
        assert_relative_eq!(view.center().latitude(), target.latitude(), epsilon = 1e-9);
        assert!(!view.is_animating());
    }

    #[test]
    fn controller_plans_against_the_live_view() {
        let points: Vec<_> = (0..6)
            .map(|i| (-121.05 + i as f64 * 0.012, 39.24 + (i % 2) as f64 * 0.01))
            .collect();
        let mut view = view(&points, 12.0);
        let mut labels = LabelController::with_rng(LabelConfig::default(), XorShiftRng::new(3));

        labels.start(Duration::ZERO, &mut view);
        labels.tick(Duration::from_millis(16), &mut view);
        assert_eq!(labels.overlay().len(), 6);
        let canvas = Rect::from_min_size(Pos2::ZERO, view.canvas_size());
        assert!(labels.overlay().iter().all(|label| canvas.contains_rect(label.label_box.rect)));

        labels.activate_label(2, &mut view);
        assert!(view.is_animating());
    }

    #[test]
    fn hover_and_tooltip_state_follow_the_engine() {
        let mut view = view(&[(-121.02, 39.24)], 12.0);
        let feature = view.layer().features()[0].clone();
        view.set_hover(0, true);
        view.show_tooltip(&feature, Coordinate::new(-121.02, 39.24));
        assert!(view.hovered.contains(&0));
        assert!(view.tooltip.is_some());
        view.set_hover(0, false);
        view.hide_tooltip();
        assert!(view.hovered.is_empty());
        assert!(view.tooltip.is_none());
    }
}
