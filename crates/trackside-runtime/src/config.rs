//! Engine configuration.
//!
//! Every tunable threshold of the engine lives in [`EngineConfig`]. The
//! defaults reproduce the pacing and styling the spectator client ships
//! with, so `EngineConfig::default()` needs no tuning.
//!
//! With the `policy-config` feature the config can be loaded from TOML or
//! JSON. Missing sections and fields fall back to their defaults:
//!
//! ```toml
//! [animation]
//! long_cadence_threshold_ms = 600.0
//!
//! [resize]
//! debounce_ms = 350
//! cooldown_ms = 550
//! ```

#[cfg(feature = "policy-config")]
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "policy-config")]
use serde::{Deserialize, Serialize};

use trackside_core::Rgb;
use trackside_core::animation::Easing;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// All engine policies.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct EngineConfig {
    pub animation: AnimationPolicy,
    pub style: StylePolicy,
    pub resize: ResizePolicy,
    pub interaction: InteractionPolicy,
}

impl EngineConfig {
    #[must_use]
    pub fn with_animation(mut self, animation: AnimationPolicy) -> Self {
        self.animation = animation;
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: StylePolicy) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn with_resize(mut self, resize: ResizePolicy) -> Self {
        self.resize = resize;
        self
    }

    #[must_use]
    pub fn with_interaction(mut self, interaction: InteractionPolicy) -> Self {
        self.interaction = interaction;
        self
    }

    /// Load from a TOML string and validate.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file on disk and validate.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string and validate.
    #[cfg(feature = "policy-config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    #[cfg(feature = "policy-config")]
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::TomlSerialize)
    }

    /// Check every policy; all problems are reported at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        self.animation.collect_errors(&mut errors);
        self.style.collect_errors(&mut errors);
        self.resize.collect_errors(&mut errors);
        self.interaction.collect_errors(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ---------------------------------------------------------------------------
// Animation
// ---------------------------------------------------------------------------

/// Thresholds that turn a delta cadence into an apply mode.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct AnimationPolicy {
    /// Cadences above this are "long" and tween for most of the interval.
    pub long_cadence_threshold_ms: f64,
    /// Fraction of a long cadence spent tweening.
    pub long_cadence_ratio: f64,
    /// Floor for long-cadence tween durations.
    pub long_min_duration_ms: f64,
    /// Fraction of a short cadence spent tweening.
    pub short_cadence_ratio: f64,
    /// Ceiling for short-cadence tween durations.
    pub short_max_duration_ms: f64,
    /// Tweens shorter than this collapse to instant application.
    pub collapse_below_ms: f64,
    pub easing: Easing,
    /// Delta interval at 1x replay speed.
    pub replay_base_interval_ms: f64,
    /// Fastest delta interval regardless of replay speed.
    pub replay_min_interval_ms: f64,
}

impl Default for AnimationPolicy {
    fn default() -> Self {
        Self {
            long_cadence_threshold_ms: 600.0,
            long_cadence_ratio: 0.90,
            long_min_duration_ms: 50.0,
            short_cadence_ratio: 0.5,
            short_max_duration_ms: 50.0,
            collapse_below_ms: 20.0,
            easing: Easing::Linear,
            replay_base_interval_ms: 1250.0,
            replay_min_interval_ms: 350.0,
        }
    }
}

impl AnimationPolicy {
    #[must_use]
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    #[must_use]
    pub fn with_long_cadence_threshold_ms(mut self, ms: f64) -> Self {
        self.long_cadence_threshold_ms = ms;
        self
    }

    #[must_use]
    pub fn with_collapse_below_ms(mut self, ms: f64) -> Self {
        self.collapse_below_ms = ms;
        self
    }

    fn collect_errors(&self, errors: &mut Vec<String>) {
        let positive = [
            ("long_cadence_threshold_ms", self.long_cadence_threshold_ms),
            ("long_min_duration_ms", self.long_min_duration_ms),
            ("short_max_duration_ms", self.short_max_duration_ms),
            ("replay_base_interval_ms", self.replay_base_interval_ms),
            ("replay_min_interval_ms", self.replay_min_interval_ms),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("animation.{name} must be positive, got {value}"));
            }
        }
        let ratios = [
            ("long_cadence_ratio", self.long_cadence_ratio),
            ("short_cadence_ratio", self.short_cadence_ratio),
        ];
        for (name, value) in ratios {
            if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                errors.push(format!("animation.{name} must be in (0, 1], got {value}"));
            }
        }
        if !(self.collapse_below_ms.is_finite() && self.collapse_below_ms >= 0.0) {
            errors.push(format!(
                "animation.collapse_below_ms must be non-negative, got {}",
                self.collapse_below_ms
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

/// Visual tiers applied by the patch planner.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct StylePolicy {
    pub normal_opacity: f32,
    pub normal_label_alpha: f32,
    /// Retired, pitted, or stopped entities.
    pub dimmed_opacity: f32,
    pub dimmed_label_alpha: f32,
    /// Entities that dropped out of the feed.
    pub ghost_opacity: f32,
    pub marker_size: f32,
    pub selected_marker_size: f32,
    pub outline_width: f32,
    pub selected_outline_width: f32,
    pub outline_color: Rgb,
    pub selected_outline_color: Rgb,
    pub label_color: Rgb,
}

impl Default for StylePolicy {
    fn default() -> Self {
        Self {
            normal_opacity: 1.0,
            normal_label_alpha: 1.0,
            dimmed_opacity: 0.3,
            dimmed_label_alpha: 0.35,
            ghost_opacity: 0.1,
            marker_size: 8.0,
            selected_marker_size: 12.0,
            outline_width: 1.0,
            selected_outline_width: 2.5,
            outline_color: Rgb::BLACK,
            selected_outline_color: Rgb::WHITE,
            label_color: Rgb::WHITE,
        }
    }
}

impl StylePolicy {
    fn collect_errors(&self, errors: &mut Vec<String>) {
        let unit = [
            ("normal_opacity", self.normal_opacity),
            ("normal_label_alpha", self.normal_label_alpha),
            ("dimmed_opacity", self.dimmed_opacity),
            ("dimmed_label_alpha", self.dimmed_label_alpha),
            ("ghost_opacity", self.ghost_opacity),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("style.{name} must be in [0, 1], got {value}"));
            }
        }
        let sizes = [
            ("marker_size", self.marker_size),
            ("selected_marker_size", self.selected_marker_size),
        ];
        for (name, value) in sizes {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("style.{name} must be positive, got {value}"));
            }
        }
        let widths = [
            ("outline_width", self.outline_width),
            ("selected_outline_width", self.selected_outline_width),
        ];
        for (name, value) in widths {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(format!("style.{name} must be non-negative, got {value}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resize
// ---------------------------------------------------------------------------

/// Resize debounce and post-resize animation suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct ResizePolicy {
    /// Quiet period after the last signal before relaying out.
    pub debounce_ms: u64,
    /// How long tweens stay suppressed after a relayout.
    pub cooldown_ms: u64,
    /// Longest a burst may defer a relayout, measured from its first signal.
    pub hard_deadline_ms: u64,
    /// Ignore signals matching the last applied size.
    pub skip_same_size: bool,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 350,
            cooldown_ms: 550,
            hard_deadline_ms: 1500,
            skip_same_size: true,
        }
    }
}

impl ResizePolicy {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    #[must_use]
    pub fn hard_deadline(&self) -> Duration {
        Duration::from_millis(self.hard_deadline_ms)
    }

    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    #[must_use]
    pub fn with_cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown_ms = ms;
        self
    }

    #[must_use]
    pub fn with_hard_deadline_ms(mut self, ms: u64) -> Self {
        self.hard_deadline_ms = ms;
        self
    }

    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.hard_deadline_ms < self.debounce_ms {
            errors.push(format!(
                "resize.hard_deadline_ms ({}) must be >= resize.debounce_ms ({})",
                self.hard_deadline_ms, self.debounce_ms
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// Click bridge pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct InteractionPolicy {
    /// How often the host polls the click holder.
    pub poll_interval_ms: u64,
}

impl Default for InteractionPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl InteractionPolicy {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.poll_interval_ms == 0 {
            errors.push("interaction.poll_interval_ms must be > 0".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from loading or validating a config.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    #[cfg(feature = "policy-config")]
    Toml(toml::de::Error),
    #[cfg(feature = "policy-config")]
    TomlSerialize(toml::ser::Error),
    #[cfg(feature = "policy-config")]
    Json(serde_json::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "policy-config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            #[cfg(feature = "policy-config")]
            Self::TomlSerialize(e) => write!(f, "TOML serialize error: {e}"),
            #[cfg(feature = "policy-config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "policy-config")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "policy-config")]
            Self::TomlSerialize(e) => Some(e),
            #[cfg(feature = "policy-config")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_shipping_values() {
        let config = EngineConfig::default();
        assert_eq!(config.animation.long_cadence_threshold_ms, 600.0);
        assert_eq!(config.style.dimmed_opacity, 0.3);
        assert_eq!(config.style.dimmed_label_alpha, 0.35);
        assert_eq!(config.style.ghost_opacity, 0.1);
        assert_eq!(config.resize.debounce(), Duration::from_millis(350));
        assert_eq!(config.resize.cooldown(), Duration::from_millis(550));
        assert_eq!(
            config.interaction.poll_interval(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = EngineConfig::default();
        config.animation.long_cadence_ratio = 1.5;
        config.style.ghost_opacity = -0.1;
        config.resize = ResizePolicy::default().with_hard_deadline_ms(100);
        config.interaction.poll_interval_ms = 0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors[0].contains("long_cadence_ratio"));
    }

    #[test]
    fn validation_rejects_nan() {
        let mut config = EngineConfig::default();
        config.animation.collapse_below_ms = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[cfg(feature = "policy-config")]
    mod policy {
        use super::*;
        use std::io::Write as _;

        #[test]
        fn partial_toml_fills_defaults() {
            let config = EngineConfig::from_toml_str(
                r#"
                [resize]
                debounce_ms = 200

                [animation]
                easing = "ease-in-out"
                "#,
            )
            .expect("parse");
            assert_eq!(config.resize.debounce_ms, 200);
            assert_eq!(config.resize.cooldown_ms, 550);
            assert_eq!(config.animation.easing, Easing::EaseInOut);
            assert_eq!(config.style, StylePolicy::default());
        }

        #[test]
        fn json_round_trips_through_toml() {
            let config = EngineConfig::from_json_str(r#"{"interaction":{"poll_interval_ms":250}}"#)
                .expect("parse");
            assert_eq!(config.interaction.poll_interval_ms, 250);
            let toml = config.to_toml_string().expect("serialize");
            assert_eq!(EngineConfig::from_toml_str(&toml).expect("reparse"), config);
        }

        #[test]
        fn invalid_values_fail_loading() {
            let err = EngineConfig::from_toml_str("[interaction]\npoll_interval_ms = 0\n")
                .expect_err("must fail");
            assert!(matches!(err, ConfigError::Validation(_)));
        }

        #[test]
        fn loads_from_file() {
            let mut file = tempfile::NamedTempFile::new().expect("tempfile");
            writeln!(file, "[resize]\ncooldown_ms = 700").expect("write");
            let config = EngineConfig::from_toml_file(file.path()).expect("load");
            assert_eq!(config.resize.cooldown_ms, 700);
        }

        #[test]
        fn missing_file_is_io_error() {
            let err = EngineConfig::from_toml_file("/nonexistent/trackside.toml")
                .expect_err("must fail");
            assert!(matches!(err, ConfigError::Io(_)));
        }
    }
}
