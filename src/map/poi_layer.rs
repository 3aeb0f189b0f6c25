use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use egui::Color32;
use serde::{Deserialize, Serialize};

use super::map_tile::{TileKey, TILE_SIZE};
use crate::labels::feature::Feature;

/// Marker colour for categories missing from the palette.
pub const FALLBACK_COLOR: Color32 = Color32::from_rgb(0x6f, 0x6a, 0x60);

/// On-disk layout of the POI dataset.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoiDataset {
    /// Category name to `#rrggbb`.
    pub categories: BTreeMap<String, String>,
    pub features: Vec<Feature>,
}

/// Point features plus the palette used to draw their markers.
#[derive(Debug, Default, Clone)]
pub struct PoiLayer {
    features: Vec<Feature>,
    palette: BTreeMap<String, Color32>,
    open_only: bool,
}

impl PoiLayer {
    pub fn new(dataset: PoiDataset) -> Self {
        let palette = dataset
            .categories
            .iter()
            .filter_map(|(name, hex)| match parse_hex_color(hex) {
                Some(color) => Some((name.clone(), color)),
                None => {
                    log::warn!("ignoring colour {:?} for category {:?}", hex, name);
                    None
                }
            })
            .collect();
        Self {
            features: dataset.features,
            palette,
            open_only: false,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<PoiDataset>(text).map(Self::new)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let text = fs::read_to_string(path.as_ref())?;
        let layer = Self::from_json(&text)?;
        log::info!(
            "loaded {} features in {} categories from {}",
            layer.features.len(),
            layer.palette.len(),
            path.as_ref().display()
        );
        Ok(layer)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// "Open now" filter: only venues known to be open are drawn.
    pub fn set_open_only(&mut self, open_only: bool) {
        self.open_only = open_only;
    }

    pub fn color_for(&self, category: &str) -> Color32 {
        self.palette.get(category).copied().unwrap_or(FALLBACK_COLOR)
    }

    /// Features drawn for each tile, in tile order. A feature within `buffer_px`
    /// of a tile edge is also emitted by the neighbouring tile, so ids repeat.
    pub fn render_tiles(&self, tiles: &[TileKey], buffer_px: f64) -> Vec<Feature> {
        let mut rendered = Vec::new();
        for tile in tiles {
            let (min_x, min_y, max_x, max_y) = tile.world_bounds();
            for feature in self.drawn() {
                let Some(point) = feature.point() else {
                    continue;
                };
                let (x, y) = point.to_world(tile.z as f64);
                let inside = x >= min_x - buffer_px
                    && x < max_x + buffer_px
                    && y >= min_y - buffer_px
                    && y < max_y + buffer_px;
                if inside {
                    rendered.push(feature.clone());
                }
            }
        }
        rendered
    }

    fn drawn(&self) -> impl Iterator<Item = &Feature> {
        let open_only = self.open_only;
        self.features
            .iter()
            .filter(move |feature| !open_only || feature.hours.status_rank() == 0)
    }
}

/// Default buffer for [`PoiLayer::render_tiles`], in world pixels.
pub const TILE_BUFFER_PX: f64 = TILE_SIZE / 16.0;

fn parse_hex_color(hex: &str) -> Option<Color32> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::feature::HoursState;
    use crate::map::map_tile::Coordinate;

    const DATASET: &str = r##"{
        "categories": { "Public Art": "#c45d3e", "Broken": "c45d3e" },
        "features": [
            { "id": 1, "position": { "longitude": -121.01, "latitude": 39.26 },
              "name": "Mural", "category": "Public Art", "hours": "open" },
            { "id": 2, "name": "No geometry", "category": "Public Art" },
            { "id": 3, "position": { "longitude": -121.06, "latitude": 39.22 },
              "name": "Hall", "category": "Performance Spaces", "city": "Grass Valley" }
        ]
    }"##;

    #[test]
    fn dataset_parses_with_defaults() {
        let layer = PoiLayer::from_json(DATASET).unwrap();
        assert_eq!(layer.features().len(), 3);
        assert_eq!(layer.features()[0].hours, HoursState::Open);
        assert_eq!(layer.features()[1].position, None);
        assert_eq!(layer.features()[2].hours, HoursState::Unknown);
        assert_eq!(layer.features()[2].city.as_deref(), Some("Grass Valley"));
    }

    #[test]
    fn bundled_dataset_parses() {
        let layer = PoiLayer::from_json(include_str!("../../data/pois.json")).unwrap();
        assert!(layer.features().len() > 32);
        assert!(layer.features().iter().all(|f| layer.color_for(&f.category) != FALLBACK_COLOR));
        let mut ids: Vec<_> = layer.features().iter().map(|f| f.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), layer.features().len());
    }

    #[test]
    fn palette_falls_back_for_unknown_and_malformed_colours() {
        let layer = PoiLayer::from_json(DATASET).unwrap();
        assert_eq!(layer.color_for("Public Art"), Color32::from_rgb(0xc4, 0x5d, 0x3e));
        assert_eq!(layer.color_for("Broken"), FALLBACK_COLOR);
        assert_eq!(layer.color_for("Nope"), FALLBACK_COLOR);
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_color("#2a6496"), Some(Color32::from_rgb(0x2a, 0x64, 0x96)));
        assert_eq!(parse_hex_color("#2a649"), None);
        assert_eq!(parse_hex_color("#zz6496"), None);
        assert_eq!(parse_hex_color("#ééé"), None);
    }

    #[test]
    fn features_near_tile_edges_are_emitted_twice() {
        let z = 12;
        let inside = TileKey::containing(&Coordinate::new(-121.0, 39.2), z);
        let (min_x, min_y, _, max_y) = inside.world_bounds();
        let on_edge = Coordinate::from_world(min_x + 2.0, (min_y + max_y) / 2.0, z as f64);
        let dataset = PoiDataset {
            categories: BTreeMap::new(),
            features: vec![Feature::new(9, on_edge, "Edge", "Public Art")],
        };
        let layer = PoiLayer::new(dataset);
        let west = TileKey::new(z, inside.x - 1, inside.y);

        let rendered = layer.render_tiles(&[west, inside], TILE_BUFFER_PX);
        assert_eq!(rendered.iter().filter(|f| f.id == 9).count(), 2);
        assert_eq!(layer.render_tiles(&[west, inside], 0.0).len(), 1);
    }

    #[test]
    fn open_only_hides_closed_and_unknown_venues() {
        let mut layer = PoiLayer::from_json(DATASET).unwrap();
        let tiles = [TileKey::containing(&Coordinate::new(-121.03, 39.24), 6)];
        let ids = |layer: &PoiLayer| -> Vec<_> { layer.render_tiles(&tiles, 0.0).iter().map(|f| f.id).collect() };
        assert_eq!(ids(&layer), [1, 3]);
        layer.set_open_only(true);
        assert_eq!(ids(&layer), [1]);
    }
}
