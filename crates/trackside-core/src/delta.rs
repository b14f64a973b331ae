//! Per-tick entity deltas and the context they arrive with.

use std::collections::BTreeMap;

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::scene::Position;

bitflags! {
    /// Race status conditions that put an entity in the dimmed tier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct StatusFlags: u8 {
        const RETIRED = 0b0000_0001;
        const PIT     = 0b0000_0010;
        const STOPPED = 0b0000_0100;
    }
}

impl StatusFlags {
    /// Parse the feed's free-form status text.
    ///
    /// Words are split on whitespace, commas, and `|`; matching is
    /// case-insensitive. Unknown words contribute nothing.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        let mut flags = Self::empty();
        for word in status
            .split(|c: char| c.is_whitespace() || c == ',' || c == '|')
            .filter(|w| !w.is_empty())
        {
            match word.to_ascii_lowercase().as_str() {
                "retired" => flags |= Self::RETIRED,
                "pit" | "inpit" | "pitlane" => flags |= Self::PIT,
                "stopped" => flags |= Self::STOPPED,
                _ => {}
            }
        }
        flags
    }

    /// Whether the entity should render in the dimmed tier.
    #[must_use]
    pub fn is_dimmed(self) -> bool {
        !self.is_empty()
    }
}

/// Classified coordinate state of a delta entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeltaPosition {
    /// Both coordinates present and finite.
    Valid(Position),
    /// A coordinate missing and none unusable: rendered with a null position.
    Absent,
    /// A present coordinate is not a finite number.
    Invalid,
}

/// Attribute update for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityDelta {
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Short display code (three-letter abbreviation).
    pub label: Option<String>,
    /// Team color as sent by the feed, with or without `#`.
    pub color_hex: Option<String>,
    pub status: StatusFlags,
}

impl EntityDelta {
    /// A delta placing the entity at `(x, y)`.
    #[must_use]
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn color(mut self, color_hex: impl Into<String>) -> Self {
        self.color_hex = Some(color_hex.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: StatusFlags) -> Self {
        self.status = status;
        self
    }

    /// Classify the coordinates.
    #[must_use]
    pub fn position(&self) -> DeltaPosition {
        if [self.x, self.y].into_iter().flatten().any(|c| !c.is_finite()) {
            return DeltaPosition::Invalid;
        }
        match (self.x, self.y) {
            (Some(x), Some(y)) => DeltaPosition::Valid(Position::new(x, y)),
            _ => DeltaPosition::Absent,
        }
    }
}

/// One tick's worth of entity deltas, keyed by identity.
///
/// Iteration is ordered by identity so planning is deterministic no matter
/// how the feed ordered its map.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeltaBatch {
    entries: BTreeMap<String, EntityDelta>,
}

impl DeltaBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an entry.
    #[must_use]
    pub fn with(mut self, identity: impl Into<String>, delta: EntityDelta) -> Self {
        self.insert(identity, delta);
        self
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, identity: impl Into<String>, delta: EntityDelta) {
        self.entries.insert(identity.into(), delta);
    }

    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&EntityDelta> {
        self.entries.get(identity)
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityDelta)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, EntityDelta)> for DeltaBatch {
    fn from_iter<I: IntoIterator<Item = (String, EntityDelta)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Session state reported alongside each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionStatus {
    Active,
    ResetSignal,
    #[default]
    Inactive,
}

impl SessionStatus {
    /// Parse the status string of a delta payload.
    ///
    /// `active_no_cars` is an active session that simply has nothing to draw.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "active" | "active_no_cars" | "live" | "replaying" => Self::Active,
            "reset" | "reset_signal" => Self::ResetSignal,
            _ => Self::Inactive,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ResetSignal => "reset",
            Self::Inactive => "inactive",
        }
    }
}

/// Per-tick context.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickContext {
    pub selected_entity: Option<String>,
    pub session_status: SessionStatus,
    /// Current configured delta interval in milliseconds.
    pub cadence_ms: Option<f64>,
}

impl TickContext {
    /// An active session with no selection and no cadence.
    #[must_use]
    pub fn active() -> Self {
        Self {
            session_status: SessionStatus::Active,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_selected(mut self, identity: impl Into<String>) -> Self {
        self.selected_entity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.session_status = status;
        self
    }

    #[must_use]
    pub fn with_cadence_ms(mut self, cadence_ms: f64) -> Self {
        self.cadence_ms = Some(cadence_ms);
        self
    }

    /// The cadence if it is usable for pacing (finite and positive).
    #[must_use]
    pub fn cadence(&self) -> Option<f64> {
        self.cadence_ms.filter(|c| c.is_finite() && *c > 0.0)
    }
}
