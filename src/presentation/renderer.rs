//! Drawing seam between the presentation engine and a display backend.
//!
//! The engine only describes what should be on screen; a [`Renderer`] draws
//! it. Items are addressed by slot index so the engine can reuse a drawn item
//! when the next group has the same shape and texture.

use super::stimulus::{Background, Stimulus};
use tracing::{debug, info};

/// Slot index of a drawn item.
pub type ItemId = usize;

/// Display backend driven by the presentation engine.
pub trait Renderer: Send {
    /// Reveal the display window. Called once, on INITIALIZE.
    fn show_display(&mut self);

    /// Create (or rebuild) the item in `slot` and make it visible.
    fn add_item(&mut self, slot: ItemId, stimulus: &Stimulus);

    /// Change position, size, colour and timing of an existing item and make
    /// it visible.
    fn update_item(&mut self, slot: ItemId, stimulus: &Stimulus);

    /// Hide the item in `slot`.
    fn hide_item(&mut self, slot: ItemId);

    /// Apply background and fixation settings.
    fn set_background(&mut self, background: &Background);

    /// Tear the display down.
    fn close_display(&mut self) {}
}

/// Renderer that draws nothing and logs what it was asked to do.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn show_display(&mut self) {
        info!("Display shown");
    }

    fn add_item(&mut self, slot: ItemId, stimulus: &Stimulus) {
        debug!(slot, shape = %stimulus.shape, texture = %stimulus.texture, x = stimulus.x, y = stimulus.y, "Add item");
    }

    fn update_item(&mut self, slot: ItemId, stimulus: &Stimulus) {
        debug!(slot, x = stimulus.x, y = stimulus.y, lum = stimulus.lum, "Update item");
    }

    fn hide_item(&mut self, slot: ItemId) {
        debug!(slot, "Hide item");
    }

    fn set_background(&mut self, background: &Background) {
        info!(eye = %background.eye, bg_lum = background.bg_lum, "Background set");
    }

    fn close_display(&mut self) {
        info!("Display closed");
    }
}

/// Renderer call, as captured by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    /// `show_display`
    Show,
    /// `add_item`
    Add(ItemId, Stimulus),
    /// `update_item`
    Update(ItemId, Stimulus),
    /// `hide_item`
    Hide(ItemId),
    /// `set_background`
    Background(Background),
    /// `close_display`
    Close,
}

/// Renderer that records every call, for headless tests.
///
/// Clones share the same call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    calls: std::sync::Arc<parking_lot::Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    /// Slots currently visible, in ascending order, replayed from the log.
    pub fn visible(&self) -> Vec<ItemId> {
        let mut shown = std::collections::BTreeSet::new();
        for call in self.calls.lock().iter() {
            match call {
                RenderCall::Add(slot, _) | RenderCall::Update(slot, _) => {
                    shown.insert(*slot);
                }
                RenderCall::Hide(slot) => {
                    shown.remove(slot);
                }
                RenderCall::Close => shown.clear(),
                _ => {}
            }
        }
        shown.into_iter().collect()
    }

    fn push(&self, call: RenderCall) {
        self.calls.lock().push(call);
    }
}

impl Renderer for RecordingRenderer {
    fn show_display(&mut self) {
        self.push(RenderCall::Show);
    }

    fn add_item(&mut self, slot: ItemId, stimulus: &Stimulus) {
        self.push(RenderCall::Add(slot, stimulus.clone()));
    }

    fn update_item(&mut self, slot: ItemId, stimulus: &Stimulus) {
        self.push(RenderCall::Update(slot, stimulus.clone()));
    }

    fn hide_item(&mut self, slot: ItemId) {
        self.push(RenderCall::Hide(slot));
    }

    fn set_background(&mut self, background: &Background) {
        self.push(RenderCall::Background(background.clone()));
    }

    fn close_display(&mut self) {
        self.push(RenderCall::Close);
    }
}
