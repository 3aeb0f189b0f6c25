use super::feature::FeatureId;
use super::viewport::ViewportRenderer;

/// Who put the current highlight there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverSource {
    Pointer,
    IdlePreview,
}

/// The one feature allowed to be hovered at any instant.
#[derive(Debug, Default)]
pub struct HoverSlot {
    current: Option<(FeatureId, HoverSource)>,
}

impl HoverSlot {
    pub fn current(&self) -> Option<FeatureId> {
        self.current.map(|(id, _)| id)
    }

    pub fn source(&self) -> Option<HoverSource> {
        self.current.map(|(_, source)| source)
    }

    /// Clears the previous highlight before applying the new one.
    pub fn set<V: ViewportRenderer + ?Sized>(&mut self, id: FeatureId, source: HoverSource, renderer: &mut V) {
        if let Some((previous, _)) = self.current.take() {
            renderer.set_hover(previous, false);
        }
        renderer.set_hover(id, true);
        self.current = Some((id, source));
    }

    pub fn clear<V: ViewportRenderer + ?Sized>(&mut self, renderer: &mut V) -> Option<FeatureId> {
        let (previous, _) = self.current.take()?;
        renderer.set_hover(previous, false);
        Some(previous)
    }

    /// Clears only a highlight placed by `source`.
    pub fn clear_from<V: ViewportRenderer + ?Sized>(&mut self, source: HoverSource, renderer: &mut V) -> Option<FeatureId> {
        if self.source() == Some(source) {
            self.clear(renderer)
        } else {
            None
        }
    }
}
