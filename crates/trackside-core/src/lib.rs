#![forbid(unsafe_code)]

//! Core: scene descriptions, entity delta batches, color tokens, structural
//! fingerprints, and tween primitives.
//!
//! Nothing in this crate performs I/O or keeps time. The runtime crate owns
//! the clock and the canvas; this crate only describes what is drawn.

pub mod animation;
pub mod color;
pub mod delta;
pub mod fingerprint;
pub mod scene;

pub use color::Rgb;
pub use delta::{DeltaBatch, EntityDelta, SessionStatus, StatusFlags, TickContext};
pub use fingerprint::SceneFingerprint;
pub use scene::{Position, RenderableTrace, RevisionToken, SceneDescription, ValidScene};
