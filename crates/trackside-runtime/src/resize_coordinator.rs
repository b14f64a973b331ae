//! Container resize debouncing.
//!
//! The resize observer fires many times while the user drags a window edge.
//! The coordinator folds a burst into a single relayout of its final size.
//!
//! # Invariants
//!
//! - **Latest-wins**: the final size of a burst is never dropped.
//! - **Trailing debounce**: each signal pushes the relayout to
//!   `signal + debounce`.
//! - **Bounded latency**: once `hard_deadline` has passed since the first
//!   pending signal, the relayout is due even if signals keep coming.
//! - **Deterministic**: identical signal sequences yield identical decisions.
//!
//! The coordinator never touches the canvas. It says when a relayout is
//! [`due`](ResizeCoordinator::due_at); the caller performs it and reports
//! success with [`confirm_at`](ResizeCoordinator::confirm_at). A failed
//! relayout is not confirmed, so the pending size stays due and is retried.

use std::time::Duration;

use web_time::Instant;

use crate::config::ResizePolicy;
use crate::surface::ContainerSize;

#[inline]
fn duration_since_or_zero(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier)
        .unwrap_or(Duration::ZERO)
}

/// Immediate result of a resize signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Same as the applied size with nothing pending.
    Skipped,
    /// Folded into the pending burst.
    Pending,
}

/// A relayout that should happen now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeDue {
    pub size: ContainerSize,
    /// Time since the first signal of the burst.
    pub coalesce_time: Duration,
    /// Due because of the hard deadline rather than a quiet period.
    pub forced_by_deadline: bool,
}

/// What a resize step did, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAction {
    /// Nothing pending or nothing due yet.
    None,
    /// A signal was folded into the pending burst.
    Coalescing,
    /// The canvas was relaid out.
    Relayout {
        size: ContainerSize,
        coalesce_time: Duration,
        forced_by_deadline: bool,
    },
    /// The relayout was attempted and failed; it stays pending.
    Failed { size: ContainerSize },
}

/// Counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeStats {
    /// Signals received.
    pub events: u64,
    /// Relayouts confirmed.
    pub relayouts: u64,
    /// Signals that replaced an earlier pending size.
    pub coalesced: u64,
    /// Relayouts due to the hard deadline.
    pub forced: u64,
    /// Signals skipped as same-size.
    pub skipped: u64,
    /// Relayouts the canvas rejected.
    pub failures: u64,
}

/// Debounces resize signals into relayouts.
#[derive(Debug, Clone)]
pub struct ResizeCoordinator {
    policy: ResizePolicy,
    pending: Option<ContainerSize>,
    last_applied: Option<ContainerSize>,
    /// First signal of the current burst.
    window_start: Option<Instant>,
    last_signal: Option<Instant>,
    last_relayout: Option<Instant>,
    stats: ResizeStats,
}

impl ResizeCoordinator {
    #[must_use]
    pub fn new(policy: ResizePolicy) -> Self {
        Self {
            policy,
            pending: None,
            last_applied: None,
            window_start: None,
            last_signal: None,
            last_relayout: None,
            stats: ResizeStats::default(),
        }
    }

    /// Seed the size the canvas was first laid out at.
    #[must_use]
    pub fn with_initial_size(mut self, size: ContainerSize) -> Self {
        self.last_applied = Some(size);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &ResizePolicy {
        &self.policy
    }

    /// Record a resize signal at `now`.
    pub fn signal_at(&mut self, size: ContainerSize, now: Instant) -> SignalOutcome {
        self.stats.events += 1;

        if self.policy.skip_same_size && self.pending.is_none() && self.last_applied == Some(size)
        {
            self.stats.skipped += 1;
            tracing::trace!(%size, "resize skipped: same size");
            return SignalOutcome::Skipped;
        }

        if self.pending.is_some() {
            self.stats.coalesced += 1;
        }
        self.pending = Some(size);
        self.last_signal = Some(now);
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        SignalOutcome::Pending
    }

    /// The relayout due at `now`, if any.
    #[must_use]
    pub fn due_at(&self, now: Instant) -> Option<ResizeDue> {
        let size = self.pending?;
        let window_start = self.window_start?;
        let coalesce_time = duration_since_or_zero(now, window_start);

        if coalesce_time >= self.policy.hard_deadline() {
            return Some(ResizeDue {
                size,
                coalesce_time,
                forced_by_deadline: true,
            });
        }
        let last_signal = self.last_signal?;
        if duration_since_or_zero(now, last_signal) >= self.policy.debounce() {
            return Some(ResizeDue {
                size,
                coalesce_time,
                forced_by_deadline: false,
            });
        }
        None
    }

    /// Time until the pending relayout becomes due.
    #[must_use]
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        let _pending = self.pending?;
        let window_start = self.window_start?;
        let last_signal = self.last_signal?;
        let by_debounce = self
            .policy
            .debounce()
            .saturating_sub(duration_since_or_zero(now, last_signal));
        let by_deadline = self
            .policy
            .hard_deadline()
            .saturating_sub(duration_since_or_zero(now, window_start));
        Some(by_debounce.min(by_deadline))
    }

    /// Mark a due relayout as applied.
    ///
    /// Ignored when `due` no longer matches the pending size.
    pub fn confirm_at(&mut self, due: &ResizeDue, now: Instant) {
        if self.pending != Some(due.size) {
            return;
        }
        self.pending = None;
        self.window_start = None;
        self.last_applied = Some(due.size);
        self.stats.relayouts += 1;
        if due.forced_by_deadline {
            self.stats.forced += 1;
        }
        self.last_relayout = Some(now);
        tracing::debug!(
            size = %due.size,
            coalesce_ms = due.coalesce_time.as_millis() as u64,
            forced = due.forced_by_deadline,
            "relayout applied"
        );
    }

    /// Record a relayout the canvas rejected.
    pub fn record_failure(&mut self, due: &ResizeDue) {
        self.stats.failures += 1;
        tracing::trace!(size = %due.size, "relayout failed; kept pending");
    }

    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn pending(&self) -> Option<ContainerSize> {
        self.pending
    }

    #[must_use]
    pub fn last_applied(&self) -> Option<ContainerSize> {
        self.last_applied
    }

    /// When the last relayout was confirmed.
    #[must_use]
    pub fn last_relayout(&self) -> Option<Instant> {
        self.last_relayout
    }

    #[must_use]
    pub fn stats(&self) -> ResizeStats {
        self.stats
    }
}

impl Default for ResizeCoordinator {
    fn default() -> Self {
        Self::new(ResizePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn size(w: u32, h: u32) -> ContainerSize {
        ContainerSize::new(w, h)
    }

    #[test]
    fn same_size_is_skipped() {
        let mut c = ResizeCoordinator::default().with_initial_size(size(800, 600));
        assert_eq!(
            c.signal_at(size(800, 600), Instant::now()),
            SignalOutcome::Skipped
        );
        assert!(!c.has_pending());
        assert_eq!(c.stats().skipped, 1);
    }

    #[test]
    fn latest_wins_after_quiet_period() {
        let mut c = ResizeCoordinator::default();
        let base = Instant::now();
        c.signal_at(size(900, 600), base);
        c.signal_at(size(950, 600), base + ms(100));
        c.signal_at(size(1000, 640), base + ms(200));

        assert_eq!(c.due_at(base + ms(500)), None, "debounce restarts per signal");
        let due = c.due_at(base + ms(550)).expect("due");
        assert_eq!(due.size, size(1000, 640));
        assert!(!due.forced_by_deadline);
        assert_eq!(due.coalesce_time, ms(550));

        c.confirm_at(&due, base + ms(550));
        assert!(!c.has_pending());
        assert_eq!(c.last_applied(), Some(size(1000, 640)));
        let stats = c.stats();
        assert_eq!(stats.events, 3);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.relayouts, 1);
    }

    #[test]
    fn hard_deadline_bounds_continuous_bursts() {
        let mut c = ResizeCoordinator::default();
        let base = Instant::now();
        let mut t = 0;
        let mut due = None;
        while t <= 3000 {
            c.signal_at(size(800 + t as u32, 600), base + ms(t));
            if let Some(d) = c.due_at(base + ms(t)) {
                due = Some((t, d));
                break;
            }
            t += 100;
        }
        let (t, due) = due.expect("relayout within the hard deadline");
        assert_eq!(t, 1500);
        assert!(due.forced_by_deadline);
        assert_eq!(due.size, size(2300, 600));
    }

    #[test]
    fn unconfirmed_relayout_stays_due() {
        let mut c = ResizeCoordinator::default();
        let base = Instant::now();
        c.signal_at(size(500, 500), base);
        let due = c.due_at(base + ms(400)).expect("due");
        c.record_failure(&due);
        assert_eq!(c.due_at(base + ms(450)), Some(ResizeDue {
            coalesce_time: ms(450),
            ..due
        }));
        assert_eq!(c.stats().failures, 1);
        assert_eq!(c.stats().relayouts, 0);
    }

    #[test]
    fn stale_confirmation_is_ignored() {
        let mut c = ResizeCoordinator::default();
        let base = Instant::now();
        c.signal_at(size(500, 500), base);
        let due = c.due_at(base + ms(400)).expect("due");
        c.signal_at(size(600, 500), base + ms(401));
        c.confirm_at(&due, base + ms(402));
        assert_eq!(c.pending(), Some(size(600, 500)));
    }

    #[test]
    fn time_until_due_tracks_debounce_and_deadline() {
        let mut c = ResizeCoordinator::default();
        let base = Instant::now();
        assert_eq!(c.time_until_due(base), None);
        c.signal_at(size(1, 1), base);
        assert_eq!(c.time_until_due(base + ms(100)), Some(ms(250)));
        c.signal_at(size(2, 2), base + ms(1400));
        assert_eq!(c.time_until_due(base + ms(1450)), Some(ms(50)));
    }

    mod property {
        use super::*;
        use proptest::prelude::*;

        fn dimension() -> impl Strategy<Value = u32> {
            1u32..4000
        }

        fn signal_sequence(max_len: usize) -> impl Strategy<Value = Vec<(u32, u32, u64)>> {
            proptest::collection::vec((dimension(), dimension(), 0u64..600), 1..max_len)
        }

        /// Feed signals, polling at each signal time, and return applied sizes.
        fn drive(events: &[(u32, u32, u64)]) -> (ResizeCoordinator, Vec<(u64, ResizeDue)>, u64) {
            let mut c = ResizeCoordinator::default();
            let base = Instant::now();
            let mut applied = Vec::new();
            let mut t = 0u64;
            for (w, h, dt) in events {
                t += dt;
                let now = base + Duration::from_millis(t);
                if let Some(due) = c.due_at(now) {
                    c.confirm_at(&due, now);
                    applied.push((t, due));
                }
                c.signal_at(size(*w, *h), now);
                if let Some(due) = c.due_at(now) {
                    c.confirm_at(&due, now);
                    applied.push((t, due));
                }
            }
            (c, applied, t)
        }

        proptest! {
            /// The last signalled size is the last size relaid out.
            #[test]
            fn latest_wins_never_drops(events in signal_sequence(30)) {
                let (mut c, _, t) = drive(&events);
                let base_end = Instant::now() + Duration::from_millis(t);
                let settle = base_end + Duration::from_millis(2000);
                if let Some(due) = c.due_at(settle) {
                    c.confirm_at(&due, settle);
                }
                prop_assert!(!c.has_pending());
                let (w, h, _) = events[events.len() - 1];
                prop_assert_eq!(c.last_applied(), Some(size(w, h)));
            }

            /// No relayout ever waits longer than the hard deadline.
            #[test]
            fn coalesce_time_is_bounded(events in signal_sequence(40)) {
                let (_, applied, _) = drive(&events);
                for (_, due) in applied {
                    if due.forced_by_deadline {
                        prop_assert!(due.coalesce_time >= Duration::from_millis(1500));
                    }
                    // Polled only at signal times, so a relayout can slip by
                    // at most one signal gap past the deadline.
                    prop_assert!(due.coalesce_time < Duration::from_millis(1500 + 600));
                }
            }

            /// Same inputs, same decisions.
            #[test]
            fn deterministic(events in signal_sequence(30)) {
                let (a, applied_a, _) = drive(&events);
                let (b, applied_b, _) = drive(&events);
                prop_assert_eq!(applied_a, applied_b);
                prop_assert_eq!(a.stats(), b.stats());
            }
        }
    }
}
