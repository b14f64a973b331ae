#![forbid(unsafe_code)]

//! Resize storms replayed through a live host, checked with the flicker
//! detector.

use core::time::Duration;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use trackside_core::{
    DeltaBatch, EntityDelta, RenderableTrace, RevisionToken, SceneDescription, TickContext,
};
use trackside_harness::{
    ResizeStorm, StormConfig, StormPattern, analyze_ops, assert_flicker_free,
};
use trackside_runtime::{ContainerSize, EngineConfig, ResizeAction};
use trackside_web::{CanvasHost, FailOn, RecordingSurface};

fn scene() -> SceneDescription {
    SceneDescription::new(
        RevisionToken::new("r1"),
        vec![
            RenderableTrace::layer(true),
            RenderableTrace::entity("1"),
            RenderableTrace::entity("44"),
        ],
    )
}

fn live_host() -> CanvasHost {
    let mut host = CanvasHost::new(EngineConfig::default(), RecordingSurface::new());
    host.push_scene(scene());
    let batch = DeltaBatch::new()
        .with("1", EntityDelta::at(0.0, 0.0))
        .with("44", EntityDelta::at(5.0, 5.0));
    host.on_interval(&batch, &TickContext::active().with_cadence_ms(1000.0));
    host
}

fn burst(seed: u64, count: usize) -> ResizeStorm {
    ResizeStorm::new(
        StormConfig::default()
            .with_seed(seed)
            .with_pattern(StormPattern::Burst { count })
            .with_delay_range(5, 60)
            .with_case_name("burst"),
    )
}

#[test]
fn short_burst_relays_out_once_at_final_size() {
    let mut host = live_host();
    let storm = burst(42, 20);
    let outcome = storm.run(&mut host);

    assert_eq!(outcome.signals, 20);
    assert_eq!(outcome.relayouts, vec![storm.final_size()]);
    assert_eq!(outcome.forced, 0);
    assert_eq!(outcome.final_size, Some(storm.final_size()));
    outcome.analysis.assert_flicker_free();
}

#[test]
fn long_sweep_is_forced_by_hard_deadline() {
    let mut host = live_host();
    let storm = ResizeStorm::new(
        StormConfig::default()
            .with_delay_range(100, 200)
            .with_pattern(StormPattern::Sweep {
                start: (400, 300),
                end: (1600, 900),
                steps: 30,
            }),
    );
    assert!(storm.total_duration_ms() >= 3000);
    let outcome = storm.run(&mut host);

    assert!(outcome.forced >= 1, "{outcome:?}");
    assert_eq!(outcome.relayouts.last(), Some(&ContainerSize::new(1600, 900)));
    assert!(outcome.relayouts.len() < 30);
    outcome.analysis.assert_flicker_free();
}

#[test]
fn ticks_during_storm_never_tween_inside_cooldown() {
    let mut host = live_host();
    let storm = ResizeStorm::new(
        StormConfig::default()
            .with_seed(9)
            .with_delay_range(150, 400)
            .with_pattern(StormPattern::Oscillate {
                size_a: (800, 600),
                size_b: (1280, 720),
                cycles: 4,
            }),
    );
    let mut x = 0.0;
    let outcome = storm.run_interleaved(&mut host, |host, _| {
        x += 10.0;
        let batch = DeltaBatch::new()
            .with("1", EntityDelta::at(x, 0.0))
            .with("44", EntityDelta::at(5.0, x));
        host.on_interval(&batch, &TickContext::active().with_cadence_ms(1000.0));
        host.advance_time(Duration::from_millis(100));
        host.on_interval(&batch, &TickContext::active().with_cadence_ms(1000.0));
    });

    assert!(!outcome.relayouts.is_empty());
    assert_eq!(outcome.analysis.stats.suppressed_tweens, 0);
    assert!(outcome.analysis.stats.applies + outcome.analysis.stats.tweens > 8);
    outcome.analysis.assert_flicker_free();
}

#[test]
fn rejected_relayout_is_retried() {
    let mut host = live_host();
    host.surface_mut().expect("surface").fail_next(FailOn::Relayout);
    let storm = burst(5, 10);
    let outcome = storm.run(&mut host);

    assert_eq!(outcome.failures, 1);
    assert_eq!(outcome.relayouts, vec![storm.final_size()]);
    assert_eq!(outcome.analysis.stats.rejected, 1);
    outcome.analysis.assert_flicker_free();
}

#[test]
fn identical_scene_pushed_twice_is_not_rebuilt() {
    let mut host = live_host();
    host.push_scene(scene());
    let batch = DeltaBatch::new().with("1", EntityDelta::at(1.0, 0.0));
    host.on_interval(&batch, &TickContext::active().with_cadence_ms(100.0));
    let ops = host.surface().expect("surface").ops();
    assert_eq!(host.surface().expect("surface").count("replace_scene"), 1);
    assert_flicker_free(ops);
}

#[test]
fn storm_jsonl_has_one_line_per_signal() {
    let mut host = live_host();
    let storm = burst(1, 12);
    let outcome = storm.run(&mut host);
    let lines: Vec<&str> = outcome.jsonl.lines().collect();
    assert_eq!(lines.len(), 12);
    let last: serde_json::Value = serde_json::from_str(lines[11]).expect("valid JSON");
    assert_eq!(last["elapsed_ms"], storm.total_duration_ms());
    assert!(outcome.analysis.jsonl.contains("\"event_type\":\"analysis_complete\""));
}

#[test]
fn same_size_signals_after_relayout_do_nothing() {
    let mut host = live_host();
    let storm = ResizeStorm::new(StormConfig::default().with_pattern(StormPattern::Custom {
        events: vec![(900, 500, 10), (900, 500, 600), (900, 500, 600)],
    }));
    let outcome = storm.run(&mut host);
    assert_eq!(outcome.relayouts, vec![ContainerSize::new(900, 500)]);
    assert_eq!(host.engine().resize_stats().skipped, 2);
    assert_eq!(analyze_ops(host.surface().expect("surface").ops()).stats.relayouts, 1);
}

#[test]
fn relayout_action_reports_coalesce_time() {
    let mut host = live_host();
    host.on_resize(ContainerSize::new(700, 400));
    host.advance_time(Duration::from_millis(100));
    host.on_resize(ContainerSize::new(720, 400));
    let mut fired = None;
    for _ in 0..20 {
        if let ResizeAction::Relayout { coalesce_time, .. } =
            host.advance_time(Duration::from_millis(50)).resize
        {
            fired = Some(coalesce_time);
            break;
        }
    }
    let coalesce = fired.expect("relayout fired");
    assert!(coalesce >= Duration::from_millis(450), "{coalesce:?}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_short_burst_settles_flicker_free(seed in any::<u64>(), count in 1usize..40) {
        let mut host = live_host();
        let storm = burst(seed, count);
        let outcome = storm.run(&mut host);
        prop_assert!(outcome.analysis.flicker_free, "{}", outcome.analysis.jsonl);
        prop_assert_eq!(outcome.final_size, Some(storm.final_size()));
        prop_assert_eq!(outcome.failures, 0);
    }
}
