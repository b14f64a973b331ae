#![forbid(unsafe_code)]

//! Decoding of the host store's JSON payloads.
//!
//! The store hands over two kinds of payloads:
//!
//! ```json
//! {"status":"active","timestamp":1718000000.5,"selected_driver":"44",
//!  "cars":{"44":{"x":1.0,"y":2.0,"color":"#27F4D2","tla":"HAM","status":"pit"}}}
//! ```
//!
//! and
//!
//! ```json
//! {"revision":"r1","entities":[{"uid":null,"visible":true},{"uid":"44","visible":true,"x":null,"y":null}]}
//! ```
//!
//! Decoding is lenient about values and strict about syntax. Coordinates
//! that are strings parse as numbers when they can; anything else that is
//! not a number becomes NaN so the planner rejects that one entity. A scene
//! without a revision or entity list still decodes; the engine reports it as
//! malformed and keeps its state.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use trackside_core::{
    DeltaBatch, EntityDelta, Position, RenderableTrace, RevisionToken, SceneDescription,
    SessionStatus, StatusFlags, TickContext,
};

/// Payload decoding failure.
#[derive(Debug)]
pub enum PayloadError {
    /// The store held nothing yet.
    Empty,
    /// Not JSON, or JSON of the wrong shape.
    Json(serde_json::Error),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty payload"),
            Self::Json(e) => write!(f, "payload JSON error: {e}"),
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Empty => None,
            Self::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// One decoded delta payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TickPayload {
    pub batch: DeltaBatch,
    pub context: TickContext,
    /// Feed timestamp in seconds, when present.
    pub timestamp: Option<f64>,
}

#[derive(Deserialize)]
struct RawTick {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    selected_driver: Value,
    #[serde(default)]
    cadence_ms: Option<f64>,
    #[serde(default)]
    cars: BTreeMap<String, RawCar>,
}

#[derive(Deserialize)]
struct RawCar {
    #[serde(default)]
    x: Value,
    #[serde(default)]
    y: Value,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    tla: Option<String>,
    #[serde(default)]
    status: Value,
}

#[derive(Deserialize)]
struct RawScene {
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    entities: Option<Vec<RawTrace>>,
}

#[derive(Deserialize)]
struct RawTrace {
    #[serde(default)]
    uid: Value,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    x: Value,
    #[serde(default)]
    y: Value,
}

const fn default_visible() -> bool {
    true
}

/// Decode a delta payload.
pub fn decode_tick(json: &str) -> Result<TickPayload, PayloadError> {
    if json.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    let raw: RawTick = serde_json::from_str(json)?;
    let batch = raw
        .cars
        .into_iter()
        .map(|(identity, car)| {
            let delta = EntityDelta {
                x: coordinate(&car.x),
                y: coordinate(&car.y),
                label: car.tla,
                color_hex: car.color,
                status: status_flags(&car.status),
            };
            (identity, delta)
        })
        .collect();
    let context = TickContext {
        selected_entity: identity(&raw.selected_driver),
        session_status: raw
            .status
            .as_deref()
            .map(SessionStatus::parse)
            .unwrap_or_default(),
        cadence_ms: raw.cadence_ms,
    };
    Ok(TickPayload {
        batch,
        context,
        timestamp: raw.timestamp.filter(|t| t.is_finite()),
    })
}

/// Decode a scene payload.
pub fn decode_scene(json: &str) -> Result<SceneDescription, PayloadError> {
    if json.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    let raw: RawScene = serde_json::from_str(json)?;
    let entities = raw.entities.map(|traces| {
        traces
            .into_iter()
            .map(|trace| {
                let initial_position = match (coordinate(&trace.x), coordinate(&trace.y)) {
                    (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                        Some(Position::new(x, y))
                    }
                    _ => None,
                };
                RenderableTrace {
                    identity: identity(&trace.uid),
                    visible: trace.visible,
                    initial_position,
                }
            })
            .collect()
    });
    Ok(SceneDescription {
        revision: raw.revision.map(RevisionToken::new),
        entities,
    })
}

/// Missing or null is `None`; unusable values are NaN.
fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Some(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        _ => Some(f64::NAN),
    }
}

/// Car numbers arrive as strings or bare numbers.
fn identity(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn status_flags(value: &Value) -> StatusFlags {
    match value {
        Value::String(s) => StatusFlags::parse(s),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(StatusFlags::parse)
            .fold(StatusFlags::empty(), |acc, f| acc | f),
        _ => StatusFlags::empty(),
    }
}
