#![forbid(unsafe_code)]

//! Test harness for the trackside scene engine.
//!
//! - [`flicker_detection`] analyzes the op log a
//!   [`RecordingSurface`](trackside_web::RecordingSurface) captured and
//!   reports redundant rebuilds, tweens during resize cool-down, and patch
//!   anomalies, with a JSONL trail for each run.
//! - [`resize_storm`] generates seeded resize sequences and replays them
//!   through a [`CanvasHost`](trackside_web::CanvasHost).

pub mod flicker_detection;
pub mod resize_storm;

pub use flicker_detection::{
    AnalysisStats, EventType, FlickerAnalysis, FlickerDetector, FlickerEvent, Severity,
    analyze_ops, analyze_ops_with, assert_flicker_free,
};
pub use resize_storm::{ResizeEvent, ResizeStorm, StormConfig, StormOutcome, StormPattern};
