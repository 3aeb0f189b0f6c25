use std::error::Error;

use crate::map::map_tile::{MapTile, TileKey};

/// Where basemap rasters come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSource {
    /// CARTO dark matter, no key needed.
    Carto,
    /// Mapbox dark style with an access token.
    Mapbox { access_token: String },
}

impl TileSource {
    /// Mapbox when a non-empty token is configured, CARTO otherwise.
    pub fn from_token(token: Option<String>) -> Self {
        match token.map(|token| token.trim().to_owned()) {
            Some(access_token) if !access_token.is_empty() => TileSource::Mapbox { access_token },
            _ => TileSource::Carto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TileRetriever {
    client: reqwest::Client,
    source: TileSource,
}

impl TileRetriever {
    pub fn new(source: TileSource) -> Self {
        Self {
            client: reqwest::Client::new(),
            source,
        }
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    /// High-dpi raster URL for a tile. Both sources serve 512 px images at `@2x`.
    pub fn tile_url(&self, key: TileKey) -> String {
        let TileKey { z, x, y } = key;
        match &self.source {
            TileSource::Carto => format!("https://a.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}@2x.png"),
            TileSource::Mapbox { access_token } => format!(
                "https://api.mapbox.com/styles/v1/mapbox/dark-v11/tiles/256/{z}/{x}/{y}@2x?access_token={access_token}"
            ),
        }
    }

    /// Fetches and decodes one tile.
    pub async fn fetch_tile(&self, key: TileKey) -> Result<MapTile, Box<dyn Error + Send + Sync>> {
        log::trace!("fetching tile {}/{}/{}", key.z, key.x, key.y);
        let response = self.client.get(self.tile_url(key)).send().await?;
        if !response.status().is_success() {
            return Err(format!("tile {}/{}/{}: HTTP {}", key.z, key.x, key.y, response.status()).into());
        }
        let bytes = response.bytes().await?;
        decode_tile(key, &bytes)
    }
}

/// Decodes PNG, JPEG or WebP bytes into an RGBA tile.
pub fn decode_tile(key: TileKey, bytes: &[u8]) -> Result<MapTile, Box<dyn Error + Send + Sync>> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    Ok(MapTile::new(key, size, image.into_raw()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn urls_follow_the_source() {
        let key = TileKey::new(12, 676, 1551);
        let carto = TileRetriever::new(TileSource::Carto);
        assert_eq!(
            carto.tile_url(key),
            "https://a.basemaps.cartocdn.com/dark_all/12/676/1551@2x.png"
        );
        let mapbox = TileRetriever::new(TileSource::Mapbox {
            access_token: "pk.test".into(),
        });
        assert_eq!(
            mapbox.tile_url(key),
            "https://api.mapbox.com/styles/v1/mapbox/dark-v11/tiles/256/12/676/1551@2x?access_token=pk.test"
        );
    }

    #[test]
    fn blank_tokens_fall_back_to_carto() {
        assert_eq!(TileSource::from_token(None), TileSource::Carto);
        assert_eq!(TileSource::from_token(Some("  ".into())), TileSource::Carto);
        assert_eq!(
            TileSource::from_token(Some(" pk.abc\n".into())),
            TileSource::Mapbox {
                access_token: "pk.abc".into()
            }
        );
    }

    #[test]
    fn png_bytes_decode_to_rgba() {
        let source = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let tile = decode_tile(TileKey::new(3, 1, 2), &bytes).unwrap();
        assert_eq!(tile.image_size, [4, 2]);
        assert_eq!(tile.key, TileKey::new(3, 1, 2));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_tile(TileKey::new(0, 0, 0), b"not an image").is_err());
    }
}
