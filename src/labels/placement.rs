//! Screen-space geometry of label boxes and the ring/slot search around an anchor.

use egui::{pos2, vec2, Pos2, Rect, Vec2};
use rstar::{Envelope, RTree, RTreeObject, SelectionFunction, AABB};

use super::feature::FeatureId;

pub const LABEL_HEIGHT: f32 = 24.0;
pub const LABEL_MIN_WIDTH: f32 = 78.0;
pub const LABEL_MAX_WIDTH: f32 = 176.0;
const CHAR_WIDTH: f32 = 6.1;
const TEXT_INSET: f32 = 22.0;

/// Gap two accepted boxes must keep between them.
pub const OVERLAP_PADDING: f32 = 4.0;
/// Anchors further than this outside the canvas are not labelled.
pub const CULL_MARGIN: f32 = 24.0;
const EDGE_INSET_X: f32 = 8.0;
const EDGE_INSET_Y: f32 = 10.0;

/// Offsets of a label's bottom-centre from its anchor, in the order they are tried.
pub const SLOTS: [[f32; 2]; 12] = [
    [0.0, -14.0],
    [18.0, -18.0],
    [-18.0, -18.0],
    [24.0, -8.0],
    [-24.0, -8.0],
    [0.0, 8.0],
    [30.0, 4.0],
    [-30.0, 4.0],
    [42.0, -12.0],
    [-42.0, -12.0],
    [46.0, 2.0],
    [-46.0, 2.0],
];

/// Extra push away from the anchor applied to every slot, innermost first.
pub const RINGS: [f32; 7] = [0.0, 8.0, 14.0, 22.0, 32.0, 44.0, 58.0];

const RING_RISE: f32 = 0.55;
const RING_DROP: f32 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotPosition {
    pub ring: usize,
    pub slot: usize,
}

impl SlotPosition {
    /// Centred above the anchor with no ring push.
    pub fn is_origin(&self) -> bool {
        self.ring == 0 && self.slot == 0
    }
}

/// Footprint of one placed label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelBox {
    pub id: FeatureId,
    pub rect: Rect,
}

impl RTreeObject for LabelBox {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.rect.min.x, self.rect.min.y], [self.rect.max.x, self.rect.max.y])
    }
}

pub fn label_size(text: &str) -> Vec2 {
    let chars = text.chars().count() as f32;
    let width = (chars * CHAR_WIDTH + TEXT_INSET).clamp(LABEL_MIN_WIDTH, LABEL_MAX_WIDTH);
    vec2(width, LABEL_HEIGHT)
}

/// Boxes overlap unless a gap wider than `padding` separates them on some axis.
pub fn boxes_overlap(a: &Rect, b: &Rect, padding: f32) -> bool {
    !(a.max.x + padding < b.min.x
        || b.max.x + padding < a.min.x
        || a.max.y + padding < b.min.y
        || b.max.y + padding < a.min.y)
}

pub fn anchor_on_canvas(anchor: Pos2, canvas: Vec2) -> bool {
    anchor.x.is_finite()
        && anchor.y.is_finite()
        && anchor.x >= -CULL_MARGIN
        && anchor.x <= canvas.x + CULL_MARGIN
        && anchor.y >= -CULL_MARGIN
        && anchor.y <= canvas.y + CULL_MARGIN
}

/// Box for one ring/slot combination, clamped inside the canvas.
///
/// The lower clamp bound wins when the canvas is narrower than the label.
pub fn candidate_rect(anchor: Pos2, size: Vec2, canvas: Vec2, ring: f32, slot: [f32; 2]) -> Rect {
    let [dx, dy] = slot;
    let center_x = anchor.x + dx + if dx < 0.0 { -ring } else { ring };
    let bottom_y = anchor.y + dy + if dy < 0.0 { -ring * RING_RISE } else { ring * RING_DROP };

    let x = (center_x - size.x / 2.0)
        .min(canvas.x - size.x - EDGE_INSET_X)
        .max(EDGE_INSET_X);
    let y = (bottom_y - size.y)
        .min(canvas.y - size.y - EDGE_INSET_Y)
        .max(EDGE_INSET_Y);
    Rect::from_min_size(pos2(x, y), size)
}

struct PaddedOverlap {
    probe: Rect,
    reach: AABB<[f32; 2]>,
    padding: f32,
}

impl SelectionFunction<LabelBox> for PaddedOverlap {
    fn should_unpack_parent(&self, envelope: &AABB<[f32; 2]>) -> bool {
        self.reach.intersects(envelope)
    }

    fn should_unpack_leaf(&self, leaf: &LabelBox) -> bool {
        boxes_overlap(&self.probe, &leaf.rect, self.padding)
    }
}

/// Boxes accepted so far in one planning pass.
pub struct PlacementIndex {
    tree: RTree<LabelBox>,
    padding: f32,
}

impl Default for PlacementIndex {
    fn default() -> Self {
        Self::new(OVERLAP_PADDING)
    }
}

impl PlacementIndex {
    pub fn new(padding: f32) -> Self {
        Self {
            tree: RTree::new(),
            padding,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collides(&self, rect: &Rect) -> bool {
        // One extra point of slack so float rounding never prunes a real hit.
        let reach = rect.expand(self.padding + 1.0);
        let selection = PaddedOverlap {
            probe: *rect,
            reach: AABB::from_corners([reach.min.x, reach.min.y], [reach.max.x, reach.max.y]),
            padding: self.padding,
        };
        self.tree.locate_with_selection_function(selection).next().is_some()
    }

    pub fn insert(&mut self, label_box: LabelBox) {
        self.tree.insert(label_box);
    }

    /// First free ring/slot box around `anchor`, accepted into the index.
    /// `None` once every combination collides.
    pub fn place(&mut self, id: FeatureId, anchor: Pos2, size: Vec2, canvas: Vec2) -> Option<(LabelBox, SlotPosition)> {
        for (ring_index, &ring) in RINGS.iter().enumerate() {
            for (slot_index, &slot) in SLOTS.iter().enumerate() {
                let rect = candidate_rect(anchor, size, canvas, ring, slot);
                if self.collides(&rect) {
                    continue;
                }
                let label_box = LabelBox { id, rect };
                self.insert(label_box);
                return Some((
                    label_box,
                    SlotPosition {
                        ring: ring_index,
                        slot: slot_index,
                    },
                ));
            }
        }
        None
    }
}
