//! The canvas abstraction.
//!
//! A [`SceneSurface`] is whatever actually draws the scene: a browser
//! plotting canvas behind a JS bridge, or the recording surface used in
//! tests. The engine never reads back from it except to ask whether the
//! click listener is already installed.

use std::fmt;
use std::time::Duration;

use trackside_core::ValidScene;
use trackside_core::animation::Easing;

use crate::error::SurfaceError;
use crate::patch_planner::{SlotPatch, TweenFrame};

/// Size of the element containing the canvas, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

impl ContainerSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ContainerSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parameters of an interpolated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub duration: Duration,
    pub easing: Easing,
}

/// A click delivered by the canvas.
///
/// `identity` is `None` when the click landed on a static layer or empty
/// space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasClick {
    pub identity: Option<String>,
    /// Page clock in milliseconds.
    pub timestamp_ms: u64,
}

/// Callback installed on the canvas for click events.
pub type ClickHandler = Box<dyn FnMut(CanvasClick)>;

/// Operations the engine performs on a canvas.
///
/// Every mutating call may fail; the engine treats failures as a skipped
/// tick and retries on the next one.
pub trait SceneSurface {
    /// Structurally replace the canvas contents. Discards in-flight tweens.
    fn replace_scene(&mut self, scene: &ValidScene<'_>) -> Result<(), SurfaceError>;

    /// Apply attribute patches immediately.
    fn apply_patches(&mut self, patches: &[SlotPatch]) -> Result<(), SurfaceError>;

    /// Apply attribute patches, interpolating the positions in `frames`.
    ///
    /// Slots in `patches` without a frame snap to their new attributes.
    fn tween_patches(
        &mut self,
        patches: &[SlotPatch],
        frames: &[TweenFrame],
        transition: Transition,
    ) -> Result<(), SurfaceError>;

    /// Re-fit the canvas to its container.
    fn relayout(&mut self, size: ContainerSize) -> Result<(), SurfaceError>;

    /// Whether a click listener has already been installed.
    fn click_listener_attached(&self) -> bool;

    /// Install the click listener and set the attachment marker.
    fn install_click_listener(&mut self, handler: ClickHandler) -> Result<(), SurfaceError>;
}
