#![forbid(unsafe_code)]

//! Flicker detection over recorded canvas op logs.
//!
//! The detector walks the ops a [`RecordingSurface`] captured and flags the
//! canvas mutations a spectator would see as flicker or jitter.
//!
//! # Detection Rules
//!
//! 1. **Redundant Rebuild**: a scene replacement identical (revision and
//!    fingerprint) to the one already on the canvas. Rebuilds reset every
//!    marker, so a redundant one is a visible blink.
//! 2. **Tween While Suppressed**: a tween issued within the resize
//!    cool-down after a relayout. Markers would slide across a canvas whose
//!    coordinate space just changed.
//! 3. **Duplicate Slot Patch**: one patch set naming the same slot twice.
//! 4. **Patch Before Scene**: attribute patches with no scene on the canvas.
//! 5. **Repeated Ghost**: a slot ghosted again without being updated or
//!    rebuilt in between.
//!
//! # JSONL Logging Schema
//!
//! ```json
//! {
//!   "run_id": "session-1",
//!   "seq": 12,
//!   "at_ms": 1500,
//!   "event_type": "redundant_rebuild|tween_while_suppressed|...",
//!   "severity": "warning|error|info",
//!   "details": { "message": "...", "slot": 3 }
//! }
//! ```
//!
//! [`RecordingSurface`]: trackside_web::RecordingSurface

use core::time::Duration;
use std::collections::BTreeSet;
use std::fmt::Write as FmtWrite;
use std::io::Write;

use trackside_core::SceneFingerprint;
use trackside_runtime::{PatchKind, ResizePolicy};
use trackside_web::{RecordedOp, SurfaceOp};

// ============================================================================
// Core Types
// ============================================================================

/// Severity level for flicker events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational event (e.g., analysis summary).
    Info,
    /// Potential issue that may cause visible artifacts.
    Warning,
    /// Definite flicker detected.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Type of flicker event detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RedundantRebuild,
    TweenWhileSuppressed,
    DuplicateSlotPatch,
    PatchBeforeScene,
    RepeatedGhost,
    AnalysisComplete,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RedundantRebuild => write!(f, "redundant_rebuild"),
            Self::TweenWhileSuppressed => write!(f, "tween_while_suppressed"),
            Self::DuplicateSlotPatch => write!(f, "duplicate_slot_patch"),
            Self::PatchBeforeScene => write!(f, "patch_before_scene"),
            Self::RepeatedGhost => write!(f, "repeated_ghost"),
            Self::AnalysisComplete => write!(f, "analysis_complete"),
        }
    }
}

/// A detected flicker event.
#[derive(Debug, Clone)]
pub struct FlickerEvent {
    pub run_id: String,
    /// Sequence number of the offending op (0 for the summary).
    pub seq: u64,
    /// Host time of the offending op.
    pub at: Duration,
    pub event_type: EventType,
    pub severity: Severity,
    pub message: String,
    pub slot: Option<usize>,
    /// Present on the summary event only.
    pub stats: Option<AnalysisStats>,
}

impl FlickerEvent {
    /// Convert to JSONL format.
    pub fn to_jsonl(&self) -> String {
        let mut json = String::with_capacity(192);
        json.push('{');
        let _ = write!(json, "\"run_id\":\"{}\",", escape_json(&self.run_id));
        let _ = write!(json, "\"seq\":{},", self.seq);
        let _ = write!(json, "\"at_ms\":{},", self.at.as_millis());
        let _ = write!(json, "\"event_type\":\"{}\",", self.event_type);
        let _ = write!(json, "\"severity\":\"{}\",", self.severity);
        json.push_str("\"details\":{");
        let _ = write!(json, "\"message\":\"{}\"", escape_json(&self.message));
        if let Some(slot) = self.slot {
            let _ = write!(json, ",\"slot\":{slot}");
        }
        if let Some(ref stats) = self.stats {
            json.push_str(",\"stats\":{");
            let _ = write!(json, "\"ops\":{},", stats.ops);
            let _ = write!(json, "\"rebuilds\":{},", stats.rebuilds);
            let _ = write!(json, "\"applies\":{},", stats.applies);
            let _ = write!(json, "\"tweens\":{},", stats.tweens);
            let _ = write!(json, "\"relayouts\":{},", stats.relayouts);
            let _ = write!(json, "\"rejected\":{},", stats.rejected);
            let _ = write!(json, "\"flicker_free\":{}", stats.is_flicker_free());
            json.push('}');
        }
        json.push_str("}}");
        json
    }
}

/// Escape a string for JSON output.
fn escape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Statistics from analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub ops: u64,
    pub rebuilds: u64,
    pub applies: u64,
    pub tweens: u64,
    pub relayouts: u64,
    pub rejected: u64,
    pub redundant_rebuilds: u64,
    pub suppressed_tweens: u64,
    pub duplicate_patches: u64,
    pub orphan_patches: u64,
    pub repeated_ghosts: u64,
}

impl AnalysisStats {
    /// Returns true if no flicker-inducing events were detected.
    pub fn is_flicker_free(&self) -> bool {
        self.redundant_rebuilds == 0
            && self.suppressed_tweens == 0
            && self.duplicate_patches == 0
            && self.orphan_patches == 0
            && self.repeated_ghosts == 0
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Flicker analyzer for canvas op logs.
pub struct FlickerDetector {
    run_id: String,
    cooldown: Duration,
    scene: Option<(String, SceneFingerprint)>,
    last_relayout: Option<Duration>,
    ghosted: BTreeSet<usize>,
    events: Vec<FlickerEvent>,
    stats: AnalysisStats,
}

impl FlickerDetector {
    /// Create a new detector with the given run ID and the default resize
    /// cool-down.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cooldown: ResizePolicy::default().cooldown(),
            scene: None,
            last_relayout: None,
            ghosted: BTreeSet::new(),
            events: Vec::new(),
            stats: AnalysisStats::default(),
        }
    }

    /// Use a different resize cool-down (builder).
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn events(&self) -> &[FlickerEvent] {
        &self.events
    }

    pub fn stats(&self) -> &AnalysisStats {
        &self.stats
    }

    pub fn is_flicker_free(&self) -> bool {
        self.stats.is_flicker_free()
    }

    /// Feed one recorded op.
    pub fn feed(&mut self, recorded: &RecordedOp) {
        self.stats.ops += 1;
        match &recorded.op {
            SurfaceOp::ReplaceScene {
                revision,
                fingerprint,
                ..
            } => {
                self.stats.rebuilds += 1;
                let next = (revision.clone(), *fingerprint);
                if self.scene.as_ref() == Some(&next) {
                    self.stats.redundant_rebuilds += 1;
                    self.emit(
                        recorded,
                        EventType::RedundantRebuild,
                        Severity::Error,
                        format!("scene {revision} ({fingerprint}) rebuilt while already shown"),
                        None,
                    );
                }
                self.scene = Some(next);
                self.ghosted.clear();
            }
            SurfaceOp::ApplyPatches { patches } => {
                self.stats.applies += 1;
                self.check_patches(recorded, patches);
            }
            SurfaceOp::TweenPatches {
                patches,
                transition,
                ..
            } => {
                self.stats.tweens += 1;
                if let Some(relayout_at) = self.last_relayout
                    && recorded.at < relayout_at + self.cooldown
                    && !transition.duration.is_zero()
                {
                    self.stats.suppressed_tweens += 1;
                    self.emit(
                        recorded,
                        EventType::TweenWhileSuppressed,
                        Severity::Error,
                        format!(
                            "{}ms tween {}ms after relayout",
                            transition.duration.as_millis(),
                            (recorded.at - relayout_at).as_millis()
                        ),
                        None,
                    );
                }
                self.check_patches(recorded, patches);
            }
            SurfaceOp::Relayout(_) => {
                self.stats.relayouts += 1;
                self.last_relayout = Some(recorded.at);
            }
            SurfaceOp::Rejected { .. } => self.stats.rejected += 1,
            SurfaceOp::InstallClickListener => {}
        }
    }

    /// Feed a whole op log.
    pub fn feed_all<'a>(&mut self, ops: impl IntoIterator<Item = &'a RecordedOp>) {
        for op in ops {
            self.feed(op);
        }
    }

    fn check_patches(&mut self, recorded: &RecordedOp, patches: &[trackside_runtime::SlotPatch]) {
        if self.scene.is_none() && !patches.is_empty() {
            self.stats.orphan_patches += 1;
            self.emit(
                recorded,
                EventType::PatchBeforeScene,
                Severity::Error,
                format!("{} patches with no scene on the canvas", patches.len()),
                None,
            );
        }
        let mut seen = BTreeSet::new();
        for patch in patches {
            if !seen.insert(patch.slot) {
                self.stats.duplicate_patches += 1;
                self.emit(
                    recorded,
                    EventType::DuplicateSlotPatch,
                    Severity::Warning,
                    format!("slot {} patched twice in one call", patch.slot),
                    Some(patch.slot),
                );
            }
            match patch.kind {
                PatchKind::Ghost => {
                    if !self.ghosted.insert(patch.slot) {
                        self.stats.repeated_ghosts += 1;
                        self.emit(
                            recorded,
                            EventType::RepeatedGhost,
                            Severity::Warning,
                            format!("entity {} ghosted again", patch.identity),
                            Some(patch.slot),
                        );
                    }
                }
                PatchKind::Update => {
                    self.ghosted.remove(&patch.slot);
                }
                PatchKind::Restyle => {}
            }
        }
    }

    /// Finalize analysis and generate the summary event.
    pub fn finalize(&mut self) {
        let stats = self.stats.clone();
        self.events.push(FlickerEvent {
            run_id: self.run_id.clone(),
            seq: 0,
            at: Duration::ZERO,
            event_type: EventType::AnalysisComplete,
            severity: if stats.is_flicker_free() {
                Severity::Info
            } else {
                Severity::Warning
            },
            message: format!(
                "Analysis complete: {} ops, {} rebuilds, {} redundant, {} suppressed tweens",
                stats.ops, stats.rebuilds, stats.redundant_rebuilds, stats.suppressed_tweens
            ),
            slot: None,
            stats: Some(stats),
        });
    }

    /// Write all events to a writer in JSONL format.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for event in &self.events {
            writeln!(writer, "{}", event.to_jsonl())?;
        }
        Ok(())
    }

    /// Get JSONL output as a string.
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&event.to_jsonl());
            out.push('\n');
        }
        out
    }

    fn emit(
        &mut self,
        recorded: &RecordedOp,
        event_type: EventType,
        severity: Severity,
        message: String,
        slot: Option<usize>,
    ) {
        self.events.push(FlickerEvent {
            run_id: self.run_id.clone(),
            seq: recorded.seq,
            at: recorded.at,
            event_type,
            severity,
            message,
            slot,
            stats: None,
        });
    }
}

impl Default for FlickerDetector {
    fn default() -> Self {
        Self::new("default")
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Result of flicker detection analysis.
#[derive(Debug)]
pub struct FlickerAnalysis {
    pub flicker_free: bool,
    pub stats: AnalysisStats,
    /// Detected events (errors and warnings only).
    pub issues: Vec<FlickerEvent>,
    /// Full JSONL log.
    pub jsonl: String,
}

impl FlickerAnalysis {
    /// Assert that the op log is flicker-free, panicking with details if not.
    pub fn assert_flicker_free(&self) {
        if !self.flicker_free {
            let mut msg = String::new();
            msg.push_str("\n=== Flicker Detection Failed ===\n\n");
            let _ = writeln!(msg, "Redundant rebuilds: {}", self.stats.redundant_rebuilds);
            let _ = writeln!(msg, "Suppressed tweens: {}", self.stats.suppressed_tweens);
            let _ = writeln!(msg, "Duplicate patches: {}", self.stats.duplicate_patches);
            let _ = writeln!(msg, "Orphan patches: {}", self.stats.orphan_patches);
            let _ = writeln!(msg, "Repeated ghosts: {}", self.stats.repeated_ghosts);
            msg.push_str("\nIssues:\n");
            for issue in &self.issues {
                let _ = writeln!(
                    msg,
                    "  - [{}] {} at op {}: {}",
                    issue.severity, issue.event_type, issue.seq, issue.message
                );
            }
            msg.push_str("\nFull JSONL log:\n");
            msg.push_str(&self.jsonl);
            panic!("{msg}");
        }
    }
}

/// Analyze an op log with the default cool-down.
pub fn analyze_ops(ops: &[RecordedOp]) -> FlickerAnalysis {
    analyze_ops_with(FlickerDetector::new("analysis"), ops)
}

/// Analyze an op log with a configured detector.
pub fn analyze_ops_with(mut detector: FlickerDetector, ops: &[RecordedOp]) -> FlickerAnalysis {
    detector.feed_all(ops);
    detector.finalize();
    let issues = detector
        .events()
        .iter()
        .filter(|e| matches!(e.severity, Severity::Warning | Severity::Error))
        .filter(|e| e.event_type != EventType::AnalysisComplete)
        .cloned()
        .collect();
    FlickerAnalysis {
        flicker_free: detector.is_flicker_free(),
        stats: detector.stats().clone(),
        issues,
        jsonl: detector.to_jsonl(),
    }
}

/// Assert that an op log is flicker-free.
pub fn assert_flicker_free(ops: &[RecordedOp]) {
    analyze_ops(ops).assert_flicker_free();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use trackside_core::animation::Easing;
    use trackside_core::{RenderableTrace, SceneFingerprint};
    use trackside_runtime::{
        ContainerSize, Outline, SlotAttributes, SlotPatch, StylePolicy, Transition,
    };

    fn op(seq: u64, at_ms: u64, op: SurfaceOp) -> RecordedOp {
        RecordedOp {
            seq,
            at: Duration::from_millis(at_ms),
            op,
        }
    }

    fn replace(revision: &str) -> SurfaceOp {
        SurfaceOp::ReplaceScene {
            revision: revision.into(),
            fingerprint: SceneFingerprint::from_traces(&[RenderableTrace::entity("1")]),
            traces: 1,
        }
    }

    fn patch(slot: usize, kind: PatchKind) -> SlotPatch {
        let style = StylePolicy::default();
        SlotPatch {
            slot,
            identity: slot.to_string(),
            kind,
            attributes: SlotAttributes {
                position: None,
                label: String::new(),
                label_color: style.label_color,
                label_alpha: style.normal_label_alpha,
                color: style.label_color,
                opacity: style.ghost_opacity,
                marker_size: style.marker_size,
                outline: Outline {
                    width: style.outline_width,
                    color: style.outline_color,
                },
            },
        }
    }

    fn tween(patches: Vec<SlotPatch>) -> SurfaceOp {
        SurfaceOp::TweenPatches {
            patches,
            frames: Vec::new(),
            transition: Transition {
                duration: Duration::from_millis(900),
                easing: Easing::Linear,
            },
        }
    }

    #[test]
    fn clean_log_is_flicker_free() {
        let ops = vec![
            op(1, 0, replace("r1")),
            op(2, 0, SurfaceOp::ApplyPatches {
                patches: vec![patch(0, PatchKind::Update)],
            }),
            op(3, 1000, tween(vec![patch(0, PatchKind::Ghost)])),
        ];
        let analysis = analyze_ops(&ops);
        assert!(analysis.flicker_free, "{}", analysis.jsonl);
        assert!(analysis.issues.is_empty());
    }

    #[test]
    fn detects_redundant_rebuild() {
        let ops = vec![op(1, 0, replace("r1")), op(2, 10, replace("r1"))];
        let analysis = analyze_ops(&ops);
        assert_eq!(analysis.stats.redundant_rebuilds, 1);
        assert_eq!(analysis.issues[0].event_type, EventType::RedundantRebuild);
    }

    #[test]
    fn detects_tween_inside_cooldown() {
        let ops = vec![
            op(1, 0, replace("r1")),
            op(2, 100, SurfaceOp::Relayout(ContainerSize::new(10, 10))),
            op(3, 200, tween(vec![patch(0, PatchKind::Update)])),
            op(4, 700, tween(vec![patch(0, PatchKind::Update)])),
        ];
        let analysis = analyze_ops(&ops);
        assert_eq!(analysis.stats.suppressed_tweens, 1);
        assert_eq!(analysis.issues[0].seq, 3);
    }

    #[test]
    fn detects_duplicates_orphans_and_repeated_ghosts() {
        let ops = vec![
            op(1, 0, SurfaceOp::ApplyPatches {
                patches: vec![patch(0, PatchKind::Update)],
            }),
            op(2, 0, replace("r1")),
            op(3, 0, SurfaceOp::ApplyPatches {
                patches: vec![patch(1, PatchKind::Update), patch(1, PatchKind::Restyle)],
            }),
            op(4, 0, SurfaceOp::ApplyPatches {
                patches: vec![patch(2, PatchKind::Ghost)],
            }),
            op(5, 0, SurfaceOp::ApplyPatches {
                patches: vec![patch(2, PatchKind::Ghost)],
            }),
        ];
        let analysis = analyze_ops(&ops);
        assert_eq!(analysis.stats.orphan_patches, 1);
        assert_eq!(analysis.stats.duplicate_patches, 1);
        assert_eq!(analysis.stats.repeated_ghosts, 1);
        assert!(!analysis.flicker_free);
    }

    #[test]
    fn jsonl_has_stable_schema() {
        let mut detector = FlickerDetector::new("run \"1\"");
        detector.feed(&op(1, 0, replace("r1")));
        detector.feed(&op(2, 5, replace("r1")));
        detector.finalize();
        let jsonl = detector.to_jsonl();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
            assert_eq!(value["run_id"], "run \"1\"");
        }
        assert!(lines[0].contains("\"event_type\":\"redundant_rebuild\""));
        assert!(lines[1].contains("\"flicker_free\":false"));
    }
}
