//! One planning pass: density gate, ranking, spatial thinning and placement.
//!
//! A pass is a pure function of the unique visible set, the camera and the
//! options. Nothing random happens here, so the same inputs always give the
//! same plan.

use egui::Pos2;
use rstar::{PointDistance, RTree};

use super::config::PlannerOptions;
use super::feature::Feature;
use super::placement::{anchor_on_canvas, label_size, LabelBox, PlacementIndex, SlotPosition};
use super::viewport::Projection;
use crate::map::map_tile::Coordinate;

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub feature: Feature,
    /// Projected marker position the label belongs to.
    pub anchor: Pos2,
    pub label_box: LabelBox,
    pub slot: SlotPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementPlan {
    /// Too many (or no) features on screen: draw no labels.
    Suppressed,
    Placed(Vec<PlacedLabel>),
}

impl PlacementPlan {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, PlacementPlan::Suppressed)
    }

    pub fn labels(&self) -> &[PlacedLabel] {
        match self {
            PlacementPlan::Suppressed => &[],
            PlacementPlan::Placed(labels) => labels,
        }
    }

    pub fn into_labels(self) -> Vec<PlacedLabel> {
        match self {
            PlacementPlan::Suppressed => Vec::new(),
            PlacementPlan::Placed(labels) => labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels().len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels().is_empty()
    }
}

/// How many ranked candidates a pass may label.
pub fn candidate_limit(visible: usize, options: &PlannerOptions) -> usize {
    if visible <= options.label_all_threshold {
        visible
    } else {
        options.label_subset_count.min(visible)
    }
}

/// Minimum pixel spacing between thinned candidates. Denser scenes spread wider.
pub fn spread_px(visible: usize, options: &PlannerOptions) -> f32 {
    if visible <= options.label_all_threshold {
        options.spread_all_px
    } else {
        options.spread_subset_px
    }
}

pub fn plan<P: Projection + ?Sized>(
    unique_visible: Vec<Feature>,
    viewport: &P,
    options: &PlannerOptions,
    status_filter_active: bool,
) -> PlacementPlan {
    let visible = unique_visible.len();
    if visible == 0 || visible > options.label_max_visible {
        return PlacementPlan::Suppressed;
    }

    let prefer_open = options.status_priority.applies(status_filter_active);
    let selected = choose_candidates(unique_visible, viewport, options, prefer_open);

    let canvas = viewport.canvas_size();
    let mut index = PlacementIndex::default();
    let mut labels = Vec::with_capacity(selected.len());
    for Candidate { feature, anchor } in selected {
        if !anchor_on_canvas(anchor, canvas) {
            continue;
        }
        let Some(text) = feature.label_text() else {
            continue;
        };
        let size = label_size(text);
        if let Some((label_box, slot)) = index.place(feature.id, anchor, size, canvas) {
            labels.push(PlacedLabel {
                feature,
                anchor,
                label_box,
                slot,
            });
        }
    }

    PlacementPlan::Placed(labels)
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    feature: Feature,
    anchor: Pos2,
}

struct Ranked {
    status: u8,
    distance_m: f64,
    feature: Feature,
    point: Coordinate,
}

fn choose_candidates<P: Projection + ?Sized>(
    unique_visible: Vec<Feature>,
    viewport: &P,
    options: &PlannerOptions,
    prefer_open: bool,
) -> Vec<Candidate> {
    let visible = unique_visible.len();
    let limit = candidate_limit(visible, options);
    let spread = spread_px(visible, options);
    let center = viewport.center();

    let mut ranked: Vec<Ranked> = unique_visible
        .into_iter()
        .filter_map(|feature| {
            let point = feature.point()?;
            Some(Ranked {
                status: if prefer_open { feature.hours.status_rank() } else { 0 },
                distance_m: point.distance_to(&center),
                feature,
                point,
            })
        })
        .collect();
    // Stable: equal keys keep first-seen order.
    ranked.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| a.distance_m.total_cmp(&b.distance_m))
    });

    let candidates = ranked
        .into_iter()
        .filter_map(|Ranked { feature, point, .. }| {
            let anchor = viewport.project(point);
            (anchor.x.is_finite() && anchor.y.is_finite()).then_some(Candidate { feature, anchor })
        })
        .collect();

    thin(candidates, limit, spread)
}

/// Keep well-spaced candidates in rank order, then backfill crowded ones
/// (still in rank order) until `limit` is reached.
fn thin(candidates: Vec<Candidate>, limit: usize, spread: f32) -> Vec<Candidate> {
    let spread_2 = spread * spread;
    let mut spaced: RTree<[f32; 2]> = RTree::new();
    let mut taken = vec![false; candidates.len()];
    let mut order = Vec::with_capacity(limit.min(candidates.len()));

    for (i, candidate) in candidates.iter().enumerate() {
        if order.len() >= limit {
            break;
        }
        let point = [candidate.anchor.x, candidate.anchor.y];
        let crowded = spaced
            .nearest_neighbor(&point)
            .is_some_and(|near| near.distance_2(&point) < spread_2);
        if !crowded {
            spaced.insert(point);
            taken[i] = true;
            order.push(i);
        }
    }

    for (i, taken) in taken.iter_mut().enumerate() {
        if order.len() >= limit {
            break;
        }
        if !*taken {
            *taken = true;
            order.push(i);
        }
    }

    let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
