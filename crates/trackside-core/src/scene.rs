//! Scene descriptions: the structural definition of the canvas.
//!
//! A scene is an ordered list of renderable traces tagged with a revision
//! token. Traces with an identity are entity placeholders (one per car);
//! traces without one are static background layers (track outline, corner
//! markers, marshal posts) and are never touched by per-tick patching.
//!
//! Both top-level fields are optional so that a structurally malformed
//! description coming off the wire can still be represented. Use
//! [`SceneDescription::validate`] before acting on one.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque scene revision token.
///
/// Two descriptions with the same token are expected to describe the same
/// structure, but the engine does not rely on that alone; see
/// [`SceneFingerprint`](crate::fingerprint::SceneFingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RevisionToken(String);

impl RevisionToken {
    /// Wrap an arbitrary token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Compose the persistent layout token for a track map.
    ///
    /// The token changes whenever the session, the number of corner labels,
    /// the number of marshal posts, or the layout structure version changes.
    #[must_use]
    pub fn for_layout(
        session_key: &str,
        corner_count: usize,
        marshal_count: usize,
        layout_version: &str,
    ) -> Self {
        Self(format!(
            "trackmap_layout_{session_key}_c{corner_count}_l{marshal_count}_{layout_version}"
        ))
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in track coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Linear interpolation towards `to`; `t` is clamped to [0, 1].
    #[must_use]
    pub fn lerp(self, to: Position, t: f64) -> Position {
        let t = t.clamp(0.0, 1.0);
        Position {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }
}

/// One renderable entry of a scene.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RenderableTrace {
    /// Stable racing identity (car number). `None` for static layers.
    pub identity: Option<String>,
    /// Whether the trace is drawn at all.
    pub visible: bool,
    /// Placement at build time, if any. Car placeholders usually start empty.
    pub initial_position: Option<Position>,
}

impl RenderableTrace {
    /// A static background layer.
    #[must_use]
    pub fn layer(visible: bool) -> Self {
        Self {
            identity: None,
            visible,
            initial_position: None,
        }
    }

    /// An entity placeholder with no initial placement.
    #[must_use]
    pub fn entity(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            visible: true,
            initial_position: None,
        }
    }

    /// Builder: set the initial placement.
    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.initial_position = Some(position);
        self
    }

    /// Builder: set visibility.
    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Whether this trace is an entity placeholder rather than a static layer.
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.identity.is_some()
    }
}

/// Structural scene definition as received from the backend.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SceneDescription {
    pub revision: Option<RevisionToken>,
    pub entities: Option<Vec<RenderableTrace>>,
}

impl SceneDescription {
    /// A well-formed description.
    #[must_use]
    pub fn new(revision: RevisionToken, entities: Vec<RenderableTrace>) -> Self {
        Self {
            revision: Some(revision),
            entities: Some(entities),
        }
    }

    /// Check the structural fields and borrow them.
    pub fn validate(&self) -> Result<ValidScene<'_>, MalformedScene> {
        let revision = self
            .revision
            .as_ref()
            .ok_or(MalformedScene::MissingRevision)?;
        let entities = self
            .entities
            .as_deref()
            .ok_or(MalformedScene::MissingEntities)?;
        Ok(ValidScene { revision, entities })
    }
}

/// A borrowed, structurally complete scene.
#[derive(Debug, Clone, Copy)]
pub struct ValidScene<'a> {
    pub revision: &'a RevisionToken,
    pub entities: &'a [RenderableTrace],
}

impl ValidScene<'_> {
    /// Number of entity placeholders (static layers excluded).
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.iter().filter(|t| t.is_entity()).count()
    }
}

/// Why a [`SceneDescription`] was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedScene {
    /// No revision/layout token.
    MissingRevision,
    /// No entity list.
    MissingEntities,
}

impl fmt::Display for MalformedScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRevision => f.write_str("scene description has no revision token"),
            Self::MissingEntities => f.write_str("scene description has no entity list"),
        }
    }
}

impl std::error::Error for MalformedScene {}
