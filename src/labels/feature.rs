use serde::{Deserialize, Serialize};

use crate::map::map_tile::Coordinate;

/// Stable id of the underlying record. A renderer may emit the same id more
/// than once when a point straddles tile boundaries.
pub type FeatureId = u64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoursState {
    Open,
    Closed,
    #[default]
    Unknown,
}

impl HoursState {
    /// Lower ranks sort first when status priority is in effect.
    pub fn status_rank(self) -> u8 {
        match self {
            HoursState::Open => 0,
            HoursState::Closed | HoursState::Unknown => 1,
        }
    }
}

/// A point of interest as currently drawn by the renderer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Feature {
    pub id: FeatureId,
    /// `None` when the record has no usable point geometry.
    #[serde(default)]
    pub position: Option<Coordinate>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub hours: HoursState,
    #[serde(default)]
    pub city: Option<String>,
}

impl Feature {
    pub fn new(id: FeatureId, position: Coordinate, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            position: Some(position),
            name: name.into(),
            category: category.into(),
            hours: HoursState::Unknown,
            city: None,
        }
    }

    pub fn with_hours(mut self, hours: HoursState) -> Self {
        self.hours = hours;
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Point geometry, if present and sane.
    pub fn point(&self) -> Option<Coordinate> {
        self.position.filter(Coordinate::is_valid)
    }

    /// Trimmed display name, or `None` when there is nothing to show.
    pub fn label_text(&self) -> Option<&str> {
        let text = self.name.trim();
        (!text.is_empty()).then_some(text)
    }
}
