use std::collections::HashSet;

use super::feature::{Feature, FeatureId};

/// Collapse renderer duplicates to one feature per id, keeping first-seen order.
pub fn unique_visible(rendered: Vec<Feature>) -> Vec<Feature> {
    let mut seen: HashSet<FeatureId> = HashSet::with_capacity(rendered.len());
    let mut unique = rendered;
    unique.retain(|feature| seen.insert(feature.id));
    unique
}

/// Number of distinct ids in a rendered feature list. Called on every camera tick.
pub fn visible_count(rendered: &[Feature]) -> usize {
    rendered
        .iter()
        .map(|feature| feature.id)
        .collect::<HashSet<_>>()
        .len()
}
