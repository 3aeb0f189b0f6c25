#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use cultural_map::labels::LabelConfig;
use cultural_map::map::poi_layer::PoiLayer;
use cultural_map::maps_api::tile_retriever::{TileRetriever, TileSource};
use cultural_map::ui::map_app::MapApp;

const DEFAULT_POI_DATA: &str = "data/pois.json";

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    env_logger::init();

    let config = match dotenv::var("LABEL_CONFIG") {
        Ok(path) => LabelConfig::load(&path).unwrap_or_else(|err| {
            log::warn!("could not load label config {}: {}, using defaults", path, err);
            LabelConfig::default()
        }),
        Err(_) => LabelConfig::default(),
    };

    let data_path = dotenv::var("POI_DATA").unwrap_or_else(|_| DEFAULT_POI_DATA.to_owned());
    let layer = PoiLayer::load(&data_path).unwrap_or_else(|err| {
        log::warn!("could not load POI data {}: {}", data_path, err);
        PoiLayer::default()
    });

    let source = TileSource::from_token(dotenv::var("MAP_BOX_API_TOKEN").ok());
    log::info!("basemap source: {}", match source {
        TileSource::Carto => "carto",
        TileSource::Mapbox { .. } => "mapbox",
    });

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(egui::vec2(1440.0, 900.0))
            .with_min_inner_size(egui::vec2(400.0, 300.0))
            .with_title("Cultural Map")
            .with_resizable(true)
            .with_decorations(true),
        ..Default::default()
    };

    eframe::run_native(
        "Cultural Map",
        native_options,
        Box::new(move |cc| {
            MapApp::new(cc, TileRetriever::new(source), layer, config).map(|app| Box::new(app) as Box<dyn eframe::App>)
        }),
    )
}
