use std::collections::HashSet;
use std::error::Error;
use std::num::NonZeroUsize;
use std::time::Duration;

use eframe::egui;
use egui::{Color32, RichText, Style};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::labels::{Feature, HoursState, LabelConfig, LabelController, RecenterTarget};
use crate::map::map::{MapView, PointerHover};
use crate::map::map_tile::{MapTile, TileKey};
use crate::map::poi_layer::PoiLayer;
use crate::maps_api::tile_retriever::TileRetriever;

const TILE_CACHE_SIZE: usize = 512;

type TileResult = (TileKey, Result<MapTile, Box<dyn Error + Send + Sync>>);

/// Toolbar state kept in eframe storage.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Preferences {
    open_now: bool,
}

pub struct MapApp {
    tiles: LruCache<TileKey, MapTile>,
    pending_tiles: HashSet<TileKey>,
    failed_tiles: HashSet<TileKey>,
    tile_retriever: TileRetriever,
    sender: mpsc::UnboundedSender<TileResult>,
    receiver: mpsc::UnboundedReceiver<TileResult>,
    runtime: tokio::runtime::Runtime,
    map: MapView,
    labels: LabelController,
    selected: Option<Feature>,
    preferences: Preferences,
    tour: bool,
    started: bool,
}

impl eframe::App for MapApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.preferences);
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        toggle_fullscreen(ctx);
        let now = Duration::from_secs_f64(ctx.input(|i| i.time).max(0.0));
        self.receive_tiles();

        // Runs the pass scheduled during the previous frame.
        let next_deadline = self.labels.tick(now, &mut self.map);

        self.toolbar(ctx, now);
        self.detail_panel(ctx);

        let mut missing = Vec::new();
        egui::CentralPanel::default().frame(egui::Frame::none()).show(ctx, |ui| {
            let output = self.map.show(ui, &mut self.tiles, &mut missing, self.labels.overlay());
            for event in output.events {
                self.labels.handle_event(event, &mut self.map);
            }
            match output.pointer_hover {
                PointerHover::Over(feature) => self.labels.pointer_hover(Some(&feature), &mut self.map),
                PointerHover::Left => self.labels.pointer_hover(None, &mut self.map),
                PointerHover::Unchanged => {}
            }
            if let Some(id) = output.clicked_label {
                if let Some(feature) = self.labels.activate_label(id, &mut self.map) {
                    self.selected = Some(feature);
                }
            } else if let Some(feature) = output.clicked_marker {
                self.labels.open_feature(&feature, RecenterTarget::Marker, &mut self.map);
                self.selected = Some(feature);
            }
        });
        self.request_tiles(ctx, missing);

        if !self.started && self.map.is_ready() {
            self.labels.start(now, &mut self.map);
            self.started = true;
        }

        if self.labels.needs_frame() || self.map.is_animating() {
            ctx.request_repaint();
        } else if let Some(deadline) = next_deadline {
            ctx.request_repaint_after(deadline.saturating_sub(now));
        }
    }
}

impl MapApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        tile_retriever: TileRetriever,
        layer: PoiLayer,
        config: LabelConfig,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        cc.egui_ctx.set_style(dark_theme_style(&cc.egui_ctx));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("tile-fetcher")
            .enable_all()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let preferences: Preferences = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();
        let mut map = MapView::new(&cc.egui_ctx, "cultural_map_view", layer, config.coarse_pointer);
        map.set_open_only(preferences.open_now);
        let mut labels = LabelController::new(config);
        labels.set_status_filter_active(preferences.open_now, &mut map);

        Ok(Self {
            tiles: LruCache::new(NonZeroUsize::new(TILE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
            pending_tiles: HashSet::new(),
            failed_tiles: HashSet::new(),
            tile_retriever,
            sender,
            receiver,
            runtime,
            map,
            labels,
            selected: None,
            preferences,
            tour: false,
            started: false,
        })
    }

    fn receive_tiles(&mut self) {
        while let Ok((key, result)) = self.receiver.try_recv() {
            self.pending_tiles.remove(&key);
            match result {
                Ok(tile) => {
                    self.tiles.put(key, tile);
                }
                Err(err) => {
                    log::warn!("tile {}/{}/{} failed: {}", key.z, key.x, key.y, err);
                    self.failed_tiles.insert(key);
                }
            }
        }
    }

    fn request_tiles(&mut self, ctx: &egui::Context, missing: Vec<TileKey>) {
        for key in missing {
            if self.pending_tiles.contains(&key) || self.failed_tiles.contains(&key) || self.tiles.contains(&key) {
                continue;
            }
            let sender = self.sender.clone();
            let tile_retriever = self.tile_retriever.clone();
            let requester = ctx.clone();
            self.runtime.spawn(async move {
                let result = tile_retriever.fetch_tile(key).await;
                if sender.send((key, result)).is_err() {
                    log::debug!("tile {}/{}/{} arrived after shutdown", key.z, key.x, key.y);
                }
                requester.request_repaint();
            });
            self.pending_tiles.insert(key);
        }
    }

    fn toolbar(&mut self, ctx: &egui::Context, now: Duration) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Cultural Map");
                ui.separator();
                if ui.checkbox(&mut self.preferences.open_now, "Open now").changed() {
                    self.map.set_open_only(self.preferences.open_now);
                    self.labels
                        .set_status_filter_active(self.preferences.open_now, &mut self.map);
                }
                if ui.checkbox(&mut self.tour, "Guided tour").changed() {
                    self.labels.set_tour_active(self.tour, now, &mut self.map);
                }
                ui.separator();
                ui.weak(format!("{} labels", self.labels.overlay().len()));
            });
        });
    }

    fn detail_panel(&mut self, ctx: &egui::Context) {
        let Some(feature) = &self.selected else {
            return;
        };
        let mut open = true;
        egui::SidePanel::right("detail")
            .resizable(false)
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading(&feature.name);
                let color = self.map.layer().color_for(&feature.category);
                ui.label(RichText::new(&feature.category).color(color));
                if let Some(city) = &feature.city {
                    ui.label(city);
                }
                ui.label(match feature.hours {
                    HoursState::Open => "Open now",
                    HoursState::Closed => "Closed",
                    HoursState::Unknown => "Hours unknown",
                });
                if let Some(point) = feature.point() {
                    ui.monospace(format!("{:.5}, {:.5}", point.latitude(), point.longitude()));
                }
                ui.add_space(8.0);
                if ui.button("Close").clicked() {
                    open = false;
                }
            });
        if !open {
            self.selected = None;
        }
    }
}

/// F11 toggles borderless fullscreen.
fn toggle_fullscreen(ctx: &egui::Context) {
    let toggled = ctx.input(|i| {
        i.key_pressed(egui::Key::F11)
            .then(|| !i.viewport().fullscreen.unwrap_or(false))
    });
    if let Some(fullscreen) = toggled {
        ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
        ctx.send_viewport_cmd(egui::ViewportCommand::Decorations(!fullscreen));
        ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
    }
}

fn dark_theme_style(ctx: &egui::Context) -> Style {
    use egui::{style::Visuals, FontFamily, FontId, Rounding, Stroke, TextStyle};

    let mut style = (*ctx.style()).clone();
    style.text_styles = [
        (TextStyle::Heading, FontId::new(20.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(15.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(13.0, FontFamily::Monospace)),
        (TextStyle::Button, FontId::new(15.0, FontFamily::Proportional)),
        (TextStyle::Small, FontId::new(12.0, FontFamily::Proportional)),
    ]
    .into();

    let panel = Color32::from_rgb(28, 27, 25);
    style.visuals = Visuals::dark();
    style.visuals.override_text_color = Some(Color32::from_rgb(232, 226, 214));
    style.visuals.panel_fill = panel;
    style.visuals.window_fill = panel;
    style.visuals.window_rounding = Rounding::same(6.0);
    style.visuals.window_stroke = Stroke::new(1.0, Color32::from_gray(60));
    style.visuals.selection.bg_fill = Color32::from_rgb(166, 120, 48);
    style.spacing.button_padding = egui::vec2(6.0, 3.0);
    style
}
