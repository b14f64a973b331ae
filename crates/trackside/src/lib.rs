#![forbid(unsafe_code)]

//! Trackside public facade crate.
//!
//! Re-exports the scene model, the engine, and (with the `web` feature) the
//! host-driven canvas runner, plus a prelude for embedding code.

use std::fmt;

// --- Model re-exports ------------------------------------------------------

pub use trackside_core::{
    DeltaBatch, EntityDelta, Position, RenderableTrace, RevisionToken, Rgb, SceneDescription,
    SceneFingerprint, SessionStatus, StatusFlags, TickContext,
};

// --- Engine re-exports -----------------------------------------------------

pub use trackside_runtime::{
    ApplyMode, CanvasClick, ContainerSize, EngineConfig, EngineError, InteractionEvent,
    PatchKind, ResizeAction, SceneEngine, SceneSurface, SharedInteractionStore, SlotPatch,
    SurfaceError, TickInput, TickOutcome, TickReport, Transition,
};

// --- Web re-exports --------------------------------------------------------

#[cfg(feature = "web")]
pub use trackside_web::{CanvasHost, DeterministicClock, RecordingSurface, StepResult};
#[cfg(feature = "payload-parser")]
pub use trackside_web::{PayloadError, TickPayload, decode_scene, decode_tick};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for trackside embedders.
#[derive(Debug)]
pub enum Error {
    /// The engine could not complete a tick.
    Engine(EngineError),
    /// A store payload could not be decoded.
    #[cfg(feature = "payload-parser")]
    Payload(PayloadError),
    /// Policy configuration failed to load or validate.
    #[cfg(feature = "policy-config")]
    Config(trackside_runtime::ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            #[cfg(feature = "payload-parser")]
            Self::Payload(err) => write!(f, "{err}"),
            #[cfg(feature = "policy-config")]
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            #[cfg(feature = "payload-parser")]
            Self::Payload(err) => Some(err),
            #[cfg(feature = "policy-config")]
            Self::Config(err) => Some(err),
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

#[cfg(feature = "payload-parser")]
impl From<PayloadError> for Error {
    fn from(err: PayloadError) -> Self {
        Self::Payload(err)
    }
}

#[cfg(feature = "policy-config")]
impl From<trackside_runtime::ConfigError> for Error {
    fn from(err: trackside_runtime::ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Standard result type for trackside APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        ContainerSize, DeltaBatch, EngineConfig, EntityDelta, Error, InteractionEvent, Result,
        SceneDescription, SceneEngine, SceneSurface, TickContext, TickOutcome, TickReport,
    };

    #[cfg(feature = "web")]
    pub use crate::{CanvasHost, RecordingSurface};

    #[cfg(feature = "web")]
    pub use crate::web;
    pub use crate::{core, runtime};
}

pub use trackside_core as core;
pub use trackside_runtime as runtime;
#[cfg(feature = "web")]
pub use trackside_web as web;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert_and_display() {
        let err: Error = EngineError::MissingSurface.into();
        assert_eq!(err.to_string(), "no canvas attached");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[cfg(feature = "payload-parser")]
    #[test]
    fn payload_errors_propagate_with_question_mark() {
        fn load(json: &str) -> Result<SceneDescription> {
            Ok(decode_scene(json)?)
        }
        assert!(matches!(load(""), Err(Error::Payload(PayloadError::Empty))));
        assert!(load(r#"{"revision":"r1","entities":[]}"#).is_ok());
    }

    #[cfg(feature = "web")]
    #[test]
    fn prelude_drives_a_host() {
        use crate::prelude::*;

        let mut host = CanvasHost::new(EngineConfig::default(), RecordingSurface::new());
        host.push_scene(SceneDescription::new(
            RevisionToken::new("r1"),
            vec![RenderableTrace::entity("44")],
        ));
        let report = host.on_interval(
            &DeltaBatch::new().with("44", EntityDelta::at(1.0, 2.0)),
            &TickContext::active(),
        );
        assert_eq!(report.outcome, TickOutcome::Applied);
    }
}
