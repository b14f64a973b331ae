#![forbid(unsafe_code)]

//! Runtime: the scene engine that keeps one canvas in sync with live
//! telemetry.
//!
//! # Role in Trackside
//! The host hands the engine a scene description, a delta batch, and a tick
//! context once per polling interval. The engine decides whether the canvas
//! must be rebuilt, turns the deltas into per-slot patches, chooses between
//! an instant apply and a tween, and pushes the result through a
//! [`SceneSurface`]. Resize signals and canvas clicks are bridged on their
//! own timers.
//!
//! # Primary responsibilities
//! - **RevisionReconciler**: rebuild-or-patch decision.
//! - **EntityIndexMap**: identity to canvas slot.
//! - **PatchPlanner**: deltas to slot patches, ghosting, selection style.
//! - **AnimationScheduler**: instant or tweened apply, resize suppression.
//! - **InteractionBridge**: clicks to the shared interaction store.
//! - **ResizeCoordinator**: debounced relayout.
//!
//! # How it fits in the system
//! `trackside-core` describes scenes and deltas. This crate owns the clock,
//! the engine state, and the surface boundary. `trackside-web` provides a
//! deterministic host and a recording surface on top of it.

pub mod animation_scheduler;
pub mod config;
pub mod engine;
pub mod entity_index;
pub mod error;
pub mod interaction_bridge;
pub mod patch_planner;
pub mod reconciler;
pub mod resize_coordinator;
pub mod scene_cache;
pub mod state;
pub mod surface;

pub use animation_scheduler::{
    AnimationScheduler, ApplyMode, ResizeSuppression, ScheduleDecision, ScheduleReason,
};
#[cfg(feature = "policy-config")]
pub use config::ConfigError;
pub use config::{AnimationPolicy, EngineConfig, InteractionPolicy, ResizePolicy, StylePolicy};
pub use engine::{SceneEngine, TickInput, TickOutcome, TickReport};
pub use entity_index::EntityIndexMap;
pub use error::{EngineError, SurfaceError};
pub use interaction_bridge::{
    ClickHolder, ClickRecord, InteractionBridge, InteractionEvent, InteractionPoller,
    InteractionStore, SharedInteractionStore,
};
pub use patch_planner::{
    Outline, PatchKind, PatchPlan, PatchPlanner, SlotAttributes, SlotPatch, TweenFrame,
};
pub use reconciler::{ReconcileOutcome, ReconcileStats, RevisionReconciler};
pub use resize_coordinator::{
    ResizeAction, ResizeCoordinator, ResizeDue, ResizeStats, SignalOutcome,
};
pub use scene_cache::{RebuildReason, SceneStateCache};
pub use state::EngineState;
pub use surface::{CanvasClick, ClickHandler, ContainerSize, SceneSurface, Transition};
