use std::time::Duration;

use super::candidates::{unique_visible, visible_count};
use super::config::{LabelConfig, MobileLabelOptions};
use super::feature::{Feature, FeatureId};
use super::hover::{HoverSlot, HoverSource};
use super::idle_preview::{IdlePreview, IdlePreviewState, RandomSource, XorShiftRng};
use super::placement::{boxes_overlap, OVERLAP_PADDING};
use super::planner::{plan, PlacedLabel};
use super::viewport::{FlyTo, MapEvent, ViewportRenderer, MARKER_LAYER, MOBILE_LABEL_LAYER};

/// A planning pass waiting for the next frame. At most one exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameJob {
    /// Requests folded into this job after it was scheduled.
    pub coalesced: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclutterPhase {
    Idle,
    Scheduled,
    Rendered,
}

/// Which click is being recentred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecenterTarget {
    Label,
    Marker,
}

/// Visibility rule for the always-on coarse-pointer label layer.
pub fn should_show_mobile_labels(
    tour_active: bool,
    zoom: f32,
    visible_count: usize,
    options: &MobileLabelOptions,
) -> bool {
    !tour_active && zoom >= options.min_zoom && visible_count > 0 && visible_count <= options.max_visible
}

/// Per-map label engine: frame scheduling, the painted overlay, hover and idle preview.
pub struct LabelController<R = XorShiftRng> {
    config: LabelConfig,
    pending_frame: Option<FrameJob>,
    phase: DeclutterPhase,
    overlay: Vec<PlacedLabel>,
    hover: HoverSlot,
    idle: IdlePreview<R>,
    tour_active: bool,
    status_filter_active: bool,
    mobile_labels_visible: Option<bool>,
    passes: u64,
}

impl LabelController<XorShiftRng> {
    pub fn new(config: LabelConfig) -> Self {
        Self::with_rng(config, XorShiftRng::from_clock())
    }
}

impl<R: RandomSource> LabelController<R> {
    pub fn with_rng(config: LabelConfig, rng: R) -> Self {
        let idle = IdlePreview::new(config.idle_preview.clone(), rng);
        Self {
            config,
            pending_frame: None,
            phase: DeclutterPhase::Idle,
            overlay: Vec::new(),
            hover: HoverSlot::default(),
            idle,
            tour_active: false,
            status_filter_active: false,
            mobile_labels_visible: None,
            passes: 0,
        }
    }

    pub fn phase(&self) -> DeclutterPhase {
        self.phase
    }

    /// Labels painted by the most recent completed pass.
    pub fn overlay(&self) -> &[PlacedLabel] {
        &self.overlay
    }

    pub fn hovered(&self) -> Option<FeatureId> {
        self.hover.current()
    }

    pub fn idle_state(&self) -> IdlePreviewState {
        self.idle.state()
    }

    pub fn mobile_labels_visible(&self) -> Option<bool> {
        self.mobile_labels_visible
    }

    pub fn needs_frame(&self) -> bool {
        self.pending_frame.is_some()
    }

    /// Completed planning passes since construction.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Initial binding once the marker layer exists.
    pub fn start<V: ViewportRenderer + ?Sized>(&mut self, now: Duration, renderer: &mut V) {
        self.schedule_update();
        self.update_mobile_label_visibility(renderer);
        self.idle.schedule(now, self.tour_active, &*renderer);
    }

    /// Requests a pass on the next frame. Returns `true` only when a new job was created.
    pub fn schedule_update(&mut self) -> bool {
        if !self.config.smart_labels_enabled {
            return false;
        }
        match &mut self.pending_frame {
            Some(job) => {
                job.coalesced += 1;
                log::trace!("frame already pending, coalesced {}", job.coalesced);
                false
            }
            None => {
                self.pending_frame = Some(FrameJob { coalesced: 0 });
                self.phase = DeclutterPhase::Scheduled;
                true
            }
        }
    }

    /// One animation frame: runs the pending pass, then any due idle-preview step.
    /// Returns the next idle-preview deadline so the host can wake up for it.
    pub fn tick<V: ViewportRenderer + ?Sized>(&mut self, now: Duration, renderer: &mut V) -> Option<Duration> {
        // The overlay planned last frame has been painted by now.
        if self.phase == DeclutterPhase::Rendered {
            self.phase = DeclutterPhase::Idle;
        }
        if let Some(job) = self.pending_frame.take() {
            self.run_pass(job, renderer);
        }
        self.idle.poll(now, self.tour_active, &mut self.hover, renderer);
        self.idle.next_deadline()
    }

    pub fn handle_event<V: ViewportRenderer + ?Sized>(&mut self, event: MapEvent, renderer: &mut V) {
        if event.is_interaction() {
            self.mark_interacted(renderer);
            return;
        }
        self.schedule_update();
        if event.is_settle() {
            self.update_mobile_label_visibility(renderer);
        }
    }

    /// Permanently stops the idle preview and cancels its pending timer.
    pub fn mark_interacted<V: ViewportRenderer + ?Sized>(&mut self, renderer: &mut V) {
        self.idle.suppress(&mut self.hover, renderer);
    }

    /// Real pointer hover over a marker, or `None` when the pointer left the markers.
    pub fn pointer_hover<V: ViewportRenderer + ?Sized>(&mut self, target: Option<&Feature>, renderer: &mut V) {
        let Some(feature) = target else {
            if self.hover.clear_from(HoverSource::Pointer, renderer).is_some() {
                renderer.hide_tooltip();
            }
            return;
        };

        self.mark_interacted(renderer);
        if self.hover.current() == Some(feature.id) {
            return;
        }
        self.hover.set(feature.id, HoverSource::Pointer, renderer);
        let at = feature.point().unwrap_or_else(|| renderer.center());
        renderer.show_tooltip(feature, at);
    }

    /// Flies to a feature the user opened. `false` if it has no geometry.
    pub fn open_feature<V: ViewportRenderer + ?Sized>(
        &mut self,
        feature: &Feature,
        target: RecenterTarget,
        renderer: &mut V,
    ) -> bool {
        let Some(center) = feature.point() else {
            return false;
        };
        let recenter = &self.config.recenter;
        let (min_zoom, duration_ms) = match target {
            RecenterTarget::Label => (recenter.label_min_zoom, recenter.label_duration_ms),
            RecenterTarget::Marker => (recenter.marker_min_zoom, recenter.marker_duration_ms),
        };
        renderer.fly_to(FlyTo {
            center,
            zoom: renderer.zoom().max(min_zoom),
            duration: Duration::from_millis(duration_ms),
        });
        true
    }

    /// Click on a painted label: recentre and hand the feature back for its detail view.
    pub fn activate_label<V: ViewportRenderer + ?Sized>(&mut self, id: FeatureId, renderer: &mut V) -> Option<Feature> {
        let feature = self
            .overlay
            .iter()
            .find(|label| label.feature.id == id)?
            .feature
            .clone();
        self.open_feature(&feature, RecenterTarget::Label, renderer);
        Some(feature)
    }

    pub fn update_mobile_label_visibility<V: ViewportRenderer + ?Sized>(&mut self, renderer: &mut V) {
        if !self.config.coarse_pointer || !renderer.has_layer(MOBILE_LABEL_LAYER) {
            return;
        }
        let visible = visible_count(&renderer.query_rendered_features(MARKER_LAYER));
        let show = should_show_mobile_labels(self.tour_active, renderer.zoom(), visible, &self.config.mobile);
        if self.mobile_labels_visible != Some(show) {
            log::debug!("mobile labels {} ({} visible)", if show { "shown" } else { "hidden" }, visible);
        }
        self.mobile_labels_visible = Some(show);
        renderer.set_layer_visible(MOBILE_LABEL_LAYER, show);
    }

    /// Guided tours replace ambient labels with their own stop numbering.
    pub fn set_tour_active<V: ViewportRenderer + ?Sized>(&mut self, active: bool, now: Duration, renderer: &mut V) {
        if self.tour_active == active {
            return;
        }
        self.tour_active = active;
        if active {
            self.cancel(renderer);
        } else {
            self.schedule_update();
            self.idle.schedule(now, false, &*renderer);
        }
        self.update_mobile_label_visibility(renderer);
    }

    /// The "open now" filter changes both ranking and the drawn marker set,
    /// so the mobile rule is re-evaluated against the filtered markers.
    pub fn set_status_filter_active<V: ViewportRenderer + ?Sized>(&mut self, active: bool, renderer: &mut V) {
        if self.status_filter_active != active {
            self.status_filter_active = active;
            self.schedule_update();
            self.update_mobile_label_visibility(renderer);
        }
    }

    /// Drops the pending frame and idle timer, clears the overlay and any highlight.
    pub fn cancel<V: ViewportRenderer + ?Sized>(&mut self, renderer: &mut V) {
        self.pending_frame = None;
        self.overlay.clear();
        self.phase = DeclutterPhase::Idle;
        self.idle.stop(&mut self.hover, renderer);
        if self.hover.clear(renderer).is_some() {
            renderer.hide_tooltip();
        }
    }

    fn run_pass<V: ViewportRenderer + ?Sized>(&mut self, job: FrameJob, renderer: &mut V) {
        if !renderer.has_layer(MARKER_LAYER) {
            self.overlay.clear();
            self.phase = DeclutterPhase::Idle;
            return;
        }
        if self.tour_active {
            self.overlay.clear();
            self.phase = DeclutterPhase::Idle;
            return;
        }

        let unique = unique_visible(renderer.query_rendered_features(MARKER_LAYER));
        let visible = unique.len();
        let plan = plan(unique, &*renderer, &self.config.planner, self.status_filter_active);
        debug_assert!(overlay_is_clear(plan.labels()), "placed labels overlap");

        self.passes += 1;
        log::debug!(
            "label pass {}: {} visible, {} placed{}, {} requests coalesced",
            self.passes,
            visible,
            plan.len(),
            if plan.is_suppressed() { " (suppressed)" } else { "" },
            job.coalesced
        );

        self.overlay = plan.into_labels();
        self.phase = DeclutterPhase::Rendered;
    }
}

fn overlay_is_clear(labels: &[PlacedLabel]) -> bool {
    labels.iter().enumerate().all(|(i, a)| {
        labels[i + 1..]
            .iter()
            .all(|b| !boxes_overlap(&a.label_box.rect, &b.label_box.rect, OVERLAP_PADDING))
    })
}
