pub mod map;
pub mod map_tile;
pub mod poi_layer;
