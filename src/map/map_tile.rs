use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Logical size in points of one tile at an integer zoom level.
pub const TILE_SIZE: f64 = 512.0;

/// Mean earth radius in metres, the one MapLibre uses for `LngLat::distanceTo`.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Web Mercator stops being finite at the poles.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinate {
    longitude: f64,
    latitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Finite and inside the usual lon/lat ranges.
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Position in Web Mercator world pixels at a (fractional) zoom level.
    /// The world is `TILE_SIZE * 2^zoom` points wide, origin at the north-west corner.
    pub fn to_world(&self, zoom: f64) -> (f64, f64) {
        let world = TILE_SIZE * 2.0_f64.powf(zoom);
        let lat_rad = self
            .latitude
            .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
            .to_radians();
        let x = (self.longitude + 180.0) / 360.0 * world;
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * world;
        (x, y)
    }

    /// Inverse of [`Coordinate::to_world`].
    pub fn from_world(x: f64, y: f64, zoom: f64) -> Self {
        let world = TILE_SIZE * 2.0_f64.powf(zoom);
        let longitude = x / world * 360.0 - 180.0;
        let latitude = (PI * (1.0 - 2.0 * y / world)).sinh().atan().to_degrees();
        Self {
            longitude: longitude.clamp(-180.0, 180.0),
            latitude: latitude.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at level `z`.
    pub fn tiles_per_axis(z: u32) -> u32 {
        1u32 << z.min(31)
    }

    /// The tile containing a coordinate at level `z`.
    pub fn containing(coordinate: &Coordinate, z: u32) -> Self {
        let (wx, wy) = coordinate.to_world(z as f64);
        let max = Self::tiles_per_axis(z) - 1;
        let x = (wx / TILE_SIZE).floor().clamp(0.0, max as f64) as u32;
        let y = (wy / TILE_SIZE).floor().clamp(0.0, max as f64) as u32;
        Self { z, x, y }
    }

    /// Bounds of this tile in world pixels at its own level: `(min_x, min_y, max_x, max_y)`.
    pub fn world_bounds(&self) -> (f64, f64, f64, f64) {
        let min_x = self.x as f64 * TILE_SIZE;
        let min_y = self.y as f64 * TILE_SIZE;
        (min_x, min_y, min_x + TILE_SIZE, min_y + TILE_SIZE)
    }
}

pub struct MapTile {
    pub key: TileKey,
    pub image_size: [usize; 2],
    rgba: Vec<u8>,
    // Created lazily, the first time the tile is painted with a live context.
    texture: Option<egui::TextureHandle>,
}

impl MapTile {
    pub fn new(key: TileKey, image_size: [usize; 2], rgba: Vec<u8>) -> Self {
        Self {
            key,
            image_size,
            rgba,
            texture: None,
        }
    }

    pub fn texture(&mut self, ctx: &egui::Context) -> &egui::TextureHandle {
        let TileKey { z, x, y } = self.key;
        let (size, rgba) = (self.image_size, &self.rgba);
        self.texture.get_or_insert_with(|| {
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba);
            ctx.load_texture(
                format!("tile_{}_{}_zoom{}", x, y, z),
                color_image,
                egui::TextureOptions::LINEAR,
            )
        })
    }
}
