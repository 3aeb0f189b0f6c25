//! Unattended hover preview that hints markers are interactive.
//!
//! Until the user first touches the map, a random visible marker is hovered
//! for a short dwell, released, and another one picked after a pause. The
//! first real interaction suppresses the cycle for the lifetime of the view.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::candidates::unique_visible;
use super::config::IdlePreviewOptions;
use super::hover::{HoverSlot, HoverSource};
use super::viewport::{ViewportRenderer, MARKER_LAYER};

/// Uniform samples in `[0, 1)`.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

/// xorshift64. Good enough for picking which marker to preview.
#[derive(Debug, Clone)]
pub struct XorShiftRng {
    state: u64,
}

impl XorShiftRng {
    pub fn new(seed: u64) -> Self {
        let state = seed.wrapping_add(1);
        Self {
            state: if state == 0 { 0x9E37_79B9_7F4A_7C15 } else { state },
        }
    }

    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x5EED);
        Self::new(nanos)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }
}

impl RandomSource for XorShiftRng {
    fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePreviewState {
    Active,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdleStep {
    Pick,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdleTimer {
    due: Duration,
    step: IdleStep,
}

pub struct IdlePreview<R> {
    options: IdlePreviewOptions,
    state: IdlePreviewState,
    timer: Option<IdleTimer>,
    rng: R,
}

impl<R: RandomSource> IdlePreview<R> {
    pub fn new(options: IdlePreviewOptions, rng: R) -> Self {
        Self {
            options,
            state: IdlePreviewState::Active,
            timer: None,
            rng,
        }
    }

    pub fn state(&self) -> IdlePreviewState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timer.map(|timer| timer.due)
    }

    /// Arms the next pick, replacing any pending timer.
    /// Returns `false` once suppressed, during a tour, or before the marker layer exists.
    pub fn schedule<V: ViewportRenderer + ?Sized>(&mut self, now: Duration, tour_active: bool, renderer: &V) -> bool {
        if !self.can_run(tour_active, renderer) {
            return false;
        }
        let delay = self.options.pick_delay(self.rng.next_unit());
        self.timer = Some(IdleTimer {
            due: now + delay,
            step: IdleStep::Pick,
        });
        true
    }

    /// Runs the pending step if its deadline has passed.
    pub fn poll<V: ViewportRenderer + ?Sized>(
        &mut self,
        now: Duration,
        tour_active: bool,
        hover: &mut HoverSlot,
        renderer: &mut V,
    ) {
        let Some(timer) = self.timer else {
            return;
        };
        if now < timer.due {
            return;
        }
        self.timer = None;
        match timer.step {
            IdleStep::Pick => self.pick(now, tour_active, hover, renderer),
            IdleStep::Release => self.release(now, tour_active, hover, renderer),
        }
    }

    /// First real interaction: stop for good and drop any preview highlight.
    pub fn suppress<V: ViewportRenderer + ?Sized>(&mut self, hover: &mut HoverSlot, renderer: &mut V) {
        if self.state == IdlePreviewState::Active {
            log::debug!("idle preview suppressed by interaction");
        }
        self.state = IdlePreviewState::Suppressed;
        self.stop(hover, renderer);
    }

    /// Cancels the pending timer and the preview highlight. The cycle may be rescheduled later.
    pub fn stop<V: ViewportRenderer + ?Sized>(&mut self, hover: &mut HoverSlot, renderer: &mut V) {
        self.timer = None;
        if hover.clear_from(HoverSource::IdlePreview, renderer).is_some() {
            renderer.hide_tooltip();
        }
    }

    fn can_run<V: ViewportRenderer + ?Sized>(&self, tour_active: bool, renderer: &V) -> bool {
        self.state == IdlePreviewState::Active && !tour_active && renderer.has_layer(MARKER_LAYER)
    }

    fn pick<V: ViewportRenderer + ?Sized>(
        &mut self,
        now: Duration,
        tour_active: bool,
        hover: &mut HoverSlot,
        renderer: &mut V,
    ) {
        if !self.can_run(tour_active, &*renderer) {
            return;
        }

        let mut pool = unique_visible(renderer.query_rendered_features(MARKER_LAYER));
        pool.truncate(self.options.max_pool);
        if pool.is_empty() {
            self.schedule(now, tour_active, &*renderer);
            return;
        }

        let index = ((self.rng.next_unit() * pool.len() as f64) as usize).min(pool.len() - 1);
        let feature = pool.swap_remove(index);
        log::trace!("idle preview picked feature {} ({} in pool)", feature.id, pool.len() + 1);

        hover.set(feature.id, HoverSource::IdlePreview, renderer);
        let at = feature.point().unwrap_or_else(|| renderer.center());
        renderer.show_tooltip(&feature, at);

        let dwell = self.options.dwell(self.rng.next_unit());
        self.timer = Some(IdleTimer {
            due: now + dwell,
            step: IdleStep::Release,
        });
    }

    fn release<V: ViewportRenderer + ?Sized>(
        &mut self,
        now: Duration,
        tour_active: bool,
        hover: &mut HoverSlot,
        renderer: &mut V,
    ) {
        if hover.clear_from(HoverSource::IdlePreview, renderer).is_some() {
            renderer.hide_tooltip();
        }
        self.schedule(now, tour_active, &*renderer);
    }
}
