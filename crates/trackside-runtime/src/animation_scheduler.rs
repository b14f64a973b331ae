//! Apply-mode selection.
//!
//! # Decision Rule
//!
//! 1) Resize suppression active → **instant**, and the first tick of a
//!    resize epoch extends the suppression deadline.
//! 2) Cadence above the long threshold → **tween** for
//!    `max(long_min, cadence × long_ratio)`.
//! 3) Any other usable cadence → **tween** for
//!    `min(short_max, cadence × short_ratio)`, collapsing to **instant**
//!    when that is below `collapse_below_ms`.
//! 4) No usable cadence → **instant**.

use std::time::Duration;

use web_time::Instant;

use trackside_core::animation::Easing;

use crate::config::AnimationPolicy;

/// How this tick's patches reach the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Instant,
    Tween { duration: Duration, easing: Easing },
}

impl ApplyMode {
    /// Transition duration; zero for instant application.
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Instant => Duration::ZERO,
            Self::Tween { duration, .. } => duration,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Tween { .. } => "tween",
        }
    }
}

/// Which rule produced the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleReason {
    ResizeSuppressed,
    LongCadence,
    ShortCadence,
    CollapsedToInstant,
    NoCadence,
}

impl ScheduleReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResizeSuppressed => "resize_suppressed",
            Self::LongCadence => "long_cadence",
            Self::ShortCadence => "short_cadence",
            Self::CollapsedToInstant => "collapsed_to_instant",
            Self::NoCadence => "no_cadence",
        }
    }
}

/// Scheduler output for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDecision {
    pub mode: ApplyMode,
    pub reason: ScheduleReason,
}

/// Post-resize animation suppression (part of the engine state).
///
/// A relayout arms suppression for a cool-down. The first tick that sees a
/// fresh arm extends the deadline to `now + cooldown`; later ticks of the
/// same resize epoch leave it alone, so suppression always runs out.
#[derive(Debug, Clone, Default)]
pub struct ResizeSuppression {
    resized_recently: bool,
    suppress_until: Option<Instant>,
    epoch: u64,
    consumed_epoch: u64,
}

impl ResizeSuppression {
    /// Arm after a relayout at `now`.
    pub fn arm(&mut self, now: Instant, cooldown: Duration) {
        let until = now + cooldown;
        self.suppress_until = Some(self.suppress_until.map_or(until, |u| u.max(until)));
        self.resized_recently = true;
        self.epoch += 1;
    }

    /// Whether suppression is in force at `now`; clears the flag once expired.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if !self.resized_recently {
            return false;
        }
        match self.suppress_until {
            Some(until) if now < until => true,
            _ => {
                self.resized_recently = false;
                self.suppress_until = None;
                false
            }
        }
    }

    /// Extend the deadline once per resize epoch. Returns whether it extended.
    fn rearm(&mut self, now: Instant, cooldown: Duration) -> bool {
        if self.consumed_epoch == self.epoch {
            return false;
        }
        self.consumed_epoch = self.epoch;
        let until = now + cooldown;
        if self.suppress_until.is_none_or(|u| u < until) {
            self.suppress_until = Some(until);
        }
        true
    }

    #[must_use]
    pub fn resized_recently(&self) -> bool {
        self.resized_recently
    }

    #[must_use]
    pub fn suppress_until(&self) -> Option<Instant> {
        self.suppress_until
    }
}

/// Picks the apply mode for each tick.
#[derive(Debug, Clone, Default)]
pub struct AnimationScheduler {
    policy: AnimationPolicy,
}

impl AnimationScheduler {
    #[must_use]
    pub fn new(policy: AnimationPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &AnimationPolicy {
        &self.policy
    }

    /// Decide the mode for a tick at `now`.
    ///
    /// `cadence_ms` values that are not finite and positive count as absent.
    pub fn schedule_at(
        &self,
        cadence_ms: Option<f64>,
        suppression: &mut ResizeSuppression,
        cooldown: Duration,
        now: Instant,
    ) -> ScheduleDecision {
        if suppression.refresh(now) {
            if suppression.rearm(now, cooldown) {
                tracing::debug!(
                    cooldown_ms = cooldown.as_millis() as u64,
                    "resize suppression re-armed"
                );
            }
            return ScheduleDecision {
                mode: ApplyMode::Instant,
                reason: ScheduleReason::ResizeSuppressed,
            };
        }
        self.for_cadence(cadence_ms)
    }

    /// Decide the mode from cadence alone.
    #[must_use]
    pub fn for_cadence(&self, cadence_ms: Option<f64>) -> ScheduleDecision {
        let Some(cadence) = cadence_ms.filter(|c| c.is_finite() && *c > 0.0) else {
            return ScheduleDecision {
                mode: ApplyMode::Instant,
                reason: ScheduleReason::NoCadence,
            };
        };
        let p = &self.policy;
        if cadence > p.long_cadence_threshold_ms {
            let ms = (cadence * p.long_cadence_ratio).max(p.long_min_duration_ms);
            return self.tween(ms, ScheduleReason::LongCadence);
        }
        let ms = (cadence * p.short_cadence_ratio).min(p.short_max_duration_ms);
        if ms < p.collapse_below_ms {
            return ScheduleDecision {
                mode: ApplyMode::Instant,
                reason: ScheduleReason::CollapsedToInstant,
            };
        }
        self.tween(ms, ScheduleReason::ShortCadence)
    }

    /// Delta interval for a replay speed: `max(min, base / speed)`.
    ///
    /// Speeds that are not finite and positive count as 1x.
    #[must_use]
    pub fn cadence_for_replay_speed(&self, speed: f64) -> f64 {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        (self.policy.replay_base_interval_ms / speed)
            .floor()
            .max(self.policy.replay_min_interval_ms)
    }

    fn tween(&self, ms: f64, reason: ScheduleReason) -> ScheduleDecision {
        ScheduleDecision {
            mode: ApplyMode::Tween {
                duration: millis_to_duration(ms),
                easing: self.policy.easing,
            },
            reason,
        }
    }
}

/// Delta interval for a replay speed with the default pacing.
#[must_use]
pub fn cadence_for_replay_speed(speed: f64) -> f64 {
    AnimationScheduler::default().cadence_for_replay_speed(speed)
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms * 1000.0).round().max(0.0) as u64)
}
