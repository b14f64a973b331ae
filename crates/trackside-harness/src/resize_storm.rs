#![forbid(unsafe_code)]

//! Resize storm generator and replay harness.
//!
//! Generates deterministic container resize sequences, drives them through a
//! [`CanvasHost`], and analyzes the canvas op log for flicker.
//!
//! # JSONL Schema
//!
//! ```json
//! {"event":"storm_resize","idx":0,"width":900,"height":500,"delay_ms":10,"elapsed_ms":0}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackside_harness::resize_storm::{ResizeStorm, StormConfig, StormPattern};
//!
//! let storm = ResizeStorm::new(
//!     StormConfig::default()
//!         .with_seed(42)
//!         .with_pattern(StormPattern::Burst { count: 50 }),
//! );
//! let outcome = storm.run(&mut host);
//! outcome.analysis.assert_flicker_free();
//! ```

use core::time::Duration;

use serde_json::json;

use trackside_runtime::{ContainerSize, ResizeAction};
use trackside_web::CanvasHost;

use crate::flicker_detection::{FlickerAnalysis, FlickerDetector, analyze_ops_with};

const FNV64_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV64_PRIME: u64 = 0x100000001b3;

/// Host time step used while settling after the last signal.
const SETTLE_STEP: Duration = Duration::from_millis(50);

// ============================================================================
// Configuration
// ============================================================================

/// Pattern type for resize storm generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StormPattern {
    /// Rapid burst of small random resizes.
    Burst { count: usize },
    /// Linear sweep between two sizes.
    Sweep {
        start: (u32, u32),
        end: (u32, u32),
        steps: usize,
    },
    /// Alternate between two sizes (window snapping, devtools toggling).
    Oscillate {
        size_a: (u32, u32),
        size_b: (u32, u32),
        cycles: usize,
    },
    /// Explicit (width, height, delay_ms) sequence.
    Custom { events: Vec<(u32, u32, u64)> },
}

impl StormPattern {
    /// Pattern name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Burst { .. } => "burst",
            Self::Sweep { .. } => "sweep",
            Self::Oscillate { .. } => "oscillate",
            Self::Custom { .. } => "custom",
        }
    }

    /// Number of signals the pattern generates.
    pub fn event_count(&self) -> usize {
        match self {
            Self::Burst { count } => *count,
            Self::Sweep { steps, .. } => *steps,
            Self::Oscillate { cycles, .. } => cycles * 2,
            Self::Custom { events } => events.len(),
        }
    }
}

impl Default for StormPattern {
    fn default() -> Self {
        Self::Burst { count: 50 }
    }
}

/// Configuration for resize storm generation.
#[derive(Debug, Clone)]
pub struct StormConfig {
    pub seed: u64,
    pub pattern: StormPattern,
    /// Container size before the storm begins.
    pub initial_size: (u32, u32),
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub case_name: String,
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            pattern: StormPattern::default(),
            initial_size: (1200, 700),
            min_delay_ms: 5,
            max_delay_ms: 60,
            min_width: 320,
            max_width: 2560,
            min_height: 240,
            max_height: 1440,
            case_name: "default".into(),
        }
    }
}

impl StormConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: StormPattern) -> Self {
        self.pattern = pattern;
        self
    }

    #[must_use]
    pub fn with_initial_size(mut self, width: u32, height: u32) -> Self {
        self.initial_size = (width, height);
        self
    }

    /// Set delay range between signals.
    #[must_use]
    pub fn with_delay_range(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_delay_ms = min_ms;
        self.max_delay_ms = max_ms;
        self
    }

    #[must_use]
    pub fn with_size_bounds(
        mut self,
        min_width: u32,
        max_width: u32,
        min_height: u32,
        max_height: u32,
    ) -> Self {
        self.min_width = min_width;
        self.max_width = max_width;
        self.min_height = min_height;
        self.max_height = max_height;
        self
    }

    #[must_use]
    pub fn with_case_name(mut self, name: impl Into<String>) -> Self {
        self.case_name = name.into();
        self
    }
}

// ============================================================================
// Seeded RNG
// ============================================================================

/// Simple LCG PRNG for deterministic generation.
#[derive(Debug, Clone)]
struct SeededRng {
    state: u64,
}

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        // LCG parameters from Numerical Recipes
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    fn chance(&mut self, p: f64) -> bool {
        ((self.next_u64() as f64) / (u64::MAX as f64)) < p
    }
}

// ============================================================================
// Resize Event
// ============================================================================

/// A single resize signal in a storm sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResizeEvent {
    pub width: u32,
    pub height: u32,
    /// Host time that passes before this signal.
    pub delay_ms: u64,
    pub index: usize,
}

impl ResizeEvent {
    pub fn new(width: u32, height: u32, delay_ms: u64, index: usize) -> Self {
        Self {
            width,
            height,
            delay_ms,
            index,
        }
    }

    pub fn size(&self) -> ContainerSize {
        ContainerSize::new(self.width, self.height)
    }

    /// Convert to JSONL format.
    pub fn to_jsonl(&self, elapsed_ms: u64) -> String {
        json!({
            "event": "storm_resize",
            "idx": self.index,
            "width": self.width,
            "height": self.height,
            "delay_ms": self.delay_ms,
            "elapsed_ms": elapsed_ms,
        })
        .to_string()
    }
}

// ============================================================================
// Storm Generator
// ============================================================================

/// What a storm did to a host.
#[derive(Debug)]
pub struct StormOutcome {
    /// Signals delivered.
    pub signals: usize,
    /// Relayouts observed, in order.
    pub relayouts: Vec<ContainerSize>,
    /// Relayouts forced by the hard deadline.
    pub forced: usize,
    /// Relayout attempts the canvas rejected.
    pub failures: usize,
    /// Size the canvas ended at.
    pub final_size: Option<ContainerSize>,
    /// One line per signal.
    pub jsonl: String,
    pub analysis: FlickerAnalysis,
}

/// Resize storm generator.
#[derive(Debug, Clone)]
pub struct ResizeStorm {
    config: StormConfig,
    events: Vec<ResizeEvent>,
    run_id: String,
}

impl ResizeStorm {
    pub fn new(config: StormConfig) -> Self {
        let run_id = format!("storm-{}-{:016x}", config.pattern.name(), config.seed);
        let mut storm = Self {
            config,
            events: Vec::new(),
            run_id,
        };
        storm.generate_events();
        storm
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn events(&self) -> &[ResizeEvent] {
        &self.events
    }

    pub fn config(&self) -> &StormConfig {
        &self.config
    }

    /// Size the container should end at.
    pub fn final_size(&self) -> ContainerSize {
        self.events.last().map_or_else(
            || ContainerSize::new(self.config.initial_size.0, self.config.initial_size.1),
            ResizeEvent::size,
        )
    }

    /// Sum of all delays.
    pub fn total_duration_ms(&self) -> u64 {
        self.events.iter().map(|e| e.delay_ms).sum()
    }

    /// FNV-1a checksum over the sequence, stable across runs.
    pub fn sequence_checksum(&self) -> String {
        let mut hash = FNV64_OFFSET_BASIS;
        for event in &self.events {
            for bytes in [
                &event.width.to_le_bytes()[..],
                &event.height.to_le_bytes()[..],
                &event.delay_ms.to_le_bytes()[..],
            ] {
                for byte in bytes {
                    hash ^= u64::from(*byte);
                    hash = hash.wrapping_mul(FNV64_PRIME);
                }
            }
        }
        format!("fnv1a64:{hash:016x}")
    }

    fn generate_events(&mut self) {
        let mut rng = SeededRng::new(self.config.seed);
        self.events = match &self.config.pattern {
            StormPattern::Burst { count } => self.generate_burst(&mut rng, *count),
            StormPattern::Sweep { start, end, steps } => {
                self.generate_sweep(&mut rng, *start, *end, *steps)
            }
            StormPattern::Oscillate {
                size_a,
                size_b,
                cycles,
            } => self.generate_oscillate(&mut rng, *size_a, *size_b, *cycles),
            StormPattern::Custom { events } => events
                .iter()
                .enumerate()
                .map(|(i, (w, h, d))| ResizeEvent::new(*w, *h, *d, i))
                .collect(),
        };
    }

    fn generate_burst(&self, rng: &mut SeededRng, count: usize) -> Vec<ResizeEvent> {
        let cfg = &self.config;
        let mut width = cfg.initial_size.0.clamp(cfg.min_width, cfg.max_width);
        let mut height = cfg.initial_size.1.clamp(cfg.min_height, cfg.max_height);
        let mut events = Vec::with_capacity(count);
        for i in 0..count {
            let delay = rng.next_range(cfg.min_delay_ms, cfg.max_delay_ms / 2);
            if rng.chance(0.7) {
                width = step_within(rng, width, 40, cfg.min_width, cfg.max_width);
            }
            if rng.chance(0.7) {
                height = step_within(rng, height, 20, cfg.min_height, cfg.max_height);
            }
            events.push(ResizeEvent::new(width, height, delay, i));
        }
        events
    }

    fn generate_sweep(
        &self,
        rng: &mut SeededRng,
        start: (u32, u32),
        end: (u32, u32),
        steps: usize,
    ) -> Vec<ResizeEvent> {
        let lerp = |a: u32, b: u32, t: f64| {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u32
        };
        (0..steps)
            .map(|i| {
                let t = if steps > 1 {
                    i as f64 / (steps - 1) as f64
                } else {
                    1.0
                };
                let delay = rng.next_range(self.config.min_delay_ms, self.config.max_delay_ms);
                ResizeEvent::new(lerp(start.0, end.0, t), lerp(start.1, end.1, t), delay, i)
            })
            .collect()
    }

    fn generate_oscillate(
        &self,
        rng: &mut SeededRng,
        size_a: (u32, u32),
        size_b: (u32, u32),
        cycles: usize,
    ) -> Vec<ResizeEvent> {
        let mut events = Vec::with_capacity(cycles * 2);
        for cycle in 0..cycles {
            for (offset, (w, h)) in [size_a, size_b].into_iter().enumerate() {
                let delay = rng.next_range(self.config.min_delay_ms, self.config.max_delay_ms);
                events.push(ResizeEvent::new(w, h, delay, cycle * 2 + offset));
            }
        }
        events
    }

    /// Drive the storm through `host` and analyze what the canvas saw.
    pub fn run(&self, host: &mut CanvasHost) -> StormOutcome {
        self.run_interleaved(host, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `after_signal` after each signal so
    /// callers can interleave ticks or clicks with the storm.
    pub fn run_interleaved<F>(&self, host: &mut CanvasHost, mut after_signal: F) -> StormOutcome
    where
        F: FnMut(&mut CanvasHost, &ResizeEvent),
    {
        let policy = host.engine().config().resize.clone();
        let mut relayouts = Vec::new();
        let mut forced = 0;
        let mut failures = 0;
        let mut jsonl = String::new();
        let mut elapsed_ms = 0;

        let mut observe = |action: ResizeAction, relayouts: &mut Vec<ContainerSize>| match action {
            ResizeAction::Relayout {
                size,
                forced_by_deadline,
                ..
            } => {
                relayouts.push(size);
                if forced_by_deadline {
                    forced += 1;
                }
            }
            ResizeAction::Failed { .. } => failures += 1,
            ResizeAction::None | ResizeAction::Coalescing => {}
        };

        for event in &self.events {
            let step = host.advance_time(Duration::from_millis(event.delay_ms));
            observe(step.resize, &mut relayouts);
            elapsed_ms += event.delay_ms;
            jsonl.push_str(&event.to_jsonl(elapsed_ms));
            jsonl.push('\n');
            let action = host.on_resize(event.size());
            observe(action, &mut relayouts);
            after_signal(host, event);
        }

        let settle = policy.hard_deadline() + policy.debounce() + SETTLE_STEP;
        let mut waited = Duration::ZERO;
        while waited < settle {
            let step = host.advance_time(SETTLE_STEP);
            observe(step.resize, &mut relayouts);
            waited += SETTLE_STEP;
        }

        tracing::info!(
            run_id = %self.run_id,
            case = %self.config.case_name,
            pattern = self.config.pattern.name(),
            signals = self.events.len(),
            relayouts = relayouts.len(),
            checksum = %self.sequence_checksum(),
            "resize storm complete"
        );

        let detector = FlickerDetector::new(self.run_id.clone()).with_cooldown(policy.cooldown());
        let ops = host.surface().map(|s| s.ops()).unwrap_or_default();
        StormOutcome {
            signals: self.events.len(),
            forced,
            failures,
            final_size: host.surface().and_then(|s| s.size()),
            relayouts,
            jsonl,
            analysis: analyze_ops_with(detector, ops),
        }
    }
}

fn step_within(rng: &mut SeededRng, value: u32, max_step: u64, min: u32, max: u32) -> u32 {
    let delta = rng.next_range(1, max_step) as i64;
    let signed = if rng.chance(0.5) { delta } else { -delta };
    (i64::from(value) + signed).clamp(i64::from(min), i64::from(max)) as u32
}
