#![forbid(unsafe_code)]

//! Log events emitted by the engine for recoverable failures.

use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;

use trackside_core::{
    DeltaBatch, EntityDelta, RenderableTrace, RevisionToken, SceneDescription, TickContext,
    ValidScene,
};
use trackside_runtime::{
    ClickHandler, ContainerSize, EngineConfig, SceneEngine, SceneSurface, SlotPatch, SurfaceError,
    TickInput, Transition, TweenFrame,
};

// ============================================================================
// Capture layer
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    message: String,
    fields: Vec<(String, String)>,
}

impl CapturedEvent {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        let message = visitor
            .0
            .iter()
            .find(|(k, _)| k == "message")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields: visitor.0,
        });
    }
}

fn capture<F: FnOnce()>(f: F) -> Vec<CapturedEvent> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(EventCapture {
        events: events.clone(),
    });
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    captured
}

fn warnings(events: &[CapturedEvent]) -> Vec<&CapturedEvent> {
    events
        .iter()
        .filter(|e| e.level == tracing::Level::WARN)
        .collect()
}

// ============================================================================
// Canvas that rejects every apply
// ============================================================================

#[derive(Default)]
struct StubbornCanvas {
    listener: bool,
}

impl SceneSurface for StubbornCanvas {
    fn replace_scene(&mut self, _scene: &ValidScene<'_>) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn apply_patches(&mut self, _patches: &[SlotPatch]) -> Result<(), SurfaceError> {
        Err(SurfaceError::rejected("apply_patches", "restyle threw"))
    }

    fn tween_patches(
        &mut self,
        _patches: &[SlotPatch],
        _frames: &[TweenFrame],
        _transition: Transition,
    ) -> Result<(), SurfaceError> {
        Err(SurfaceError::rejected("tween_patches", "animate threw"))
    }

    fn relayout(&mut self, _size: ContainerSize) -> Result<(), SurfaceError> {
        Err(SurfaceError::Detached)
    }

    fn click_listener_attached(&self) -> bool {
        self.listener
    }

    fn install_click_listener(&mut self, _handler: ClickHandler) -> Result<(), SurfaceError> {
        self.listener = true;
        Ok(())
    }
}

fn scene() -> SceneDescription {
    SceneDescription::new(
        RevisionToken::new("s1"),
        vec![RenderableTrace::entity("1"), RenderableTrace::entity("2")],
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn missing_surface_warns() {
    let events = capture(|| {
        let mut engine: SceneEngine<StubbornCanvas> = SceneEngine::new(EngineConfig::default());
        let batch = DeltaBatch::new();
        let ctx = TickContext::active();
        engine.tick(&TickInput::new(&batch, &ctx));
    });
    let warns = warnings(&events);
    assert_eq!(warns.len(), 1);
    assert!(warns[0].message.contains("without a canvas"));
}

#[test]
fn non_numeric_coordinates_warn_with_identity() {
    let events = capture(|| {
        let mut engine = SceneEngine::new(EngineConfig::default()).with_surface(StubbornCanvas {
            listener: true,
        });
        let batch = DeltaBatch::new().with(
            "2",
            EntityDelta {
                x: Some(f64::NAN),
                y: Some(1.0),
                ..EntityDelta::default()
            },
        );
        let ctx = TickContext::active();
        engine.tick(&TickInput::new(&batch, &ctx).with_scene(&scene(), true));
    });
    let warn = warnings(&events)
        .into_iter()
        .find(|e| e.message.contains("non-numeric"))
        .expect("coordinate warning");
    assert_eq!(warn.field("identity"), Some("2"));
}

#[test]
fn rejected_apply_warns_once_per_tick() {
    let events = capture(|| {
        let mut engine = SceneEngine::new(EngineConfig::default())
            .with_surface(StubbornCanvas::default());
        let batch = DeltaBatch::new().with("1", EntityDelta::at(1.0, 1.0));
        let ctx = TickContext::active();
        engine.tick(&TickInput::new(&batch, &ctx).with_scene(&scene(), true));
        engine.tick(&TickInput::new(&batch, &ctx));
    });
    let apply_warnings = warnings(&events)
        .into_iter()
        .filter(|e| e.message.contains("apply failed"))
        .count();
    assert_eq!(apply_warnings, 2);
}

#[test]
fn failed_relayout_warns() {
    let events = capture(|| {
        let mut engine = SceneEngine::new(EngineConfig::default())
            .with_surface(StubbornCanvas::default());
        let t0 = web_time::Instant::now();
        engine.on_resize_at(ContainerSize::new(300, 200), t0);
        engine.poll_resize_at(t0 + std::time::Duration::from_millis(400));
    });
    assert!(
        warnings(&events)
            .iter()
            .any(|e| e.message.contains("relayout failed"))
    );
}
