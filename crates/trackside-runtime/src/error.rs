//! Engine and surface error types.
//!
//! Every engine error is recoverable. The tick entry point logs the error
//! and reports the tick as skipped; nothing here is meant to reach the
//! embedding page as a failure.

use std::fmt;

use trackside_core::scene::MalformedScene;

/// Failure reported by a [`SceneSurface`](crate::surface::SceneSurface).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The canvas rejected the call (the drawing library threw).
    Rejected {
        operation: &'static str,
        reason: String,
    },
    /// The canvas element has been removed from the page.
    Detached,
}

impl SurfaceError {
    #[must_use]
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { operation, reason } => {
                write!(f, "canvas rejected {operation}: {reason}")
            }
            Self::Detached => f.write_str("canvas element is detached"),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// Recoverable engine failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No canvas is attached; the tick does nothing.
    MissingSurface,
    /// The scene description lacks its revision token or entity list.
    MalformedScene(MalformedScene),
    /// A delta entry carried non-numeric coordinates.
    InvalidDeltaEntry { identity: String },
    /// The canvas threw while replacing, patching, tweening, or relaying out.
    RenderApplyFailure(SurfaceError),
}

impl EngineError {
    /// Stable short name, used in logs and JSONL reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingSurface => "missing_surface",
            Self::MalformedScene(_) => "malformed_scene",
            Self::InvalidDeltaEntry { .. } => "invalid_delta_entry",
            Self::RenderApplyFailure(_) => "render_apply_failure",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSurface => f.write_str("no canvas attached"),
            Self::MalformedScene(e) => write!(f, "malformed scene: {e}"),
            Self::InvalidDeltaEntry { identity } => {
                write!(f, "delta for entity {identity} has non-numeric coordinates")
            }
            Self::RenderApplyFailure(e) => write!(f, "render apply failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedScene(e) => Some(e),
            Self::RenderApplyFailure(e) => Some(e),
            Self::MissingSurface | Self::InvalidDeltaEntry { .. } => None,
        }
    }
}

impl From<MalformedScene> for EngineError {
    fn from(e: MalformedScene) -> Self {
        Self::MalformedScene(e)
    }
}

impl From<SurfaceError> for EngineError {
    fn from(e: SurfaceError) -> Self {
        Self::RenderApplyFailure(e)
    }
}
