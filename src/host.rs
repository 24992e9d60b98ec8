//! The page the tracker runs inside.
//!
//! A `PageHost` is whatever owns the document: a webview bridge, a headless
//! driver, or an in-memory fake in tests. The tracker only ever talks to the
//! page through this trait, so it never depends on a concrete DOM binding.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a host can report while wiring up listeners.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("page listeners are already attached")]
    AlreadyAttached,

    #[error("failed to attach page listeners: {0}")]
    Attach(String),
}

/// Current viewport geometry and scroll offsets, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// Bounding rectangle relative to the viewport, as returned by
/// `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ClientRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Callbacks the host delivers to the tracker.
///
/// Implementations never panic and ignore non-finite coordinates.
pub trait PageEventSink: Send + Sync {
    /// Pointer moved to `(page_x, page_y)` in document coordinates.
    fn on_pointer_move(&self, page_x: f64, page_y: f64);

    /// The document scrolled; `scroll_y` is the new vertical offset.
    fn on_scroll(&self, scroll_y: f64);

    fn on_visibility_change(&self, hidden: bool);

    /// The page is being unloaded or navigated away from.
    fn on_page_hide(&self);
}

/// DOM-like host queried by the tracker.
pub trait PageHost: Send + Sync + 'static {
    /// Subscribe `sink` to pointer, scroll, visibility and unload events.
    fn attach(&self, sink: Arc<dyn PageEventSink>) -> Result<(), HostError>;

    /// Remove every subscription made by [`PageHost::attach`]. Once this
    /// returns the host delivers no further callbacks.
    fn detach(&self);

    fn is_hidden(&self) -> bool;

    fn has_focus(&self) -> bool;

    fn viewport(&self) -> Viewport;

    /// Look up an element by id and return its viewport-relative rectangle.
    fn element_rect(&self, id: &str) -> Option<ClientRect>;
}
