//! Per-block dependency-change detection.
//!
//! Decides once per frame whether a block's registers and LUTs must be
//! recomputed. Rules are applied in this order:
//!
//! 1. A manual IQ setting, when present, is the enable. Toggling it is a
//!    change. Hysteresis does not run while a manual setting is present.
//! 2. Without a manual setting, the calibration is re-resolved when the
//!    tuning selector changed. A new calibration identity is a change and
//!    reloads the static enable and feature enables from the record.
//! 3. While the record enable is set, dynamic feature enables are evaluated
//!    with hysteresis. A feature toggle is a change.
//! 4. While enabled, the trigger snapshot is compared field by field with the
//!    cached one. Any difference is a change and refreshes the cache.
//! 5. Frame controls that force the block off win over all of the above. A
//!    disabled block reports `Unchanged`; a block turning back on reports
//!    `Changed`.
//!
//! Repeating identical inputs always yields `Unchanged` after the first call.

use crate::backend::tuning::{CalibrationRef, TuningSelector, TuningStore};
use crate::pipeline::adapters::{CalibrationResolver, Resolution};
use crate::pipeline::hysteresis::dynamic_enable;
use crate::types::{BlockType, ControlVariable, FrameControls, ManualIqSetting, TriggerSnapshot};

/// Per-frame inputs to the detector
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    pub manual: Option<ManualIqSetting>,
    pub selector: &'a TuningSelector,
    pub trigger: &'a TriggerSnapshot,
    pub controls: &'a FrameControls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeDecision {
    Unchanged,
    Changed,
}

/// Why a block was marked changed (or held off)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    ManualToggle,
    CalibrationIdentity,
    FeatureToggle,
    EnableToggle,
    TriggerDelta(ControlVariable),
    FirstTrigger,
    Reenabled,
    ForcedOff,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: ChangeDecision,
    pub reasons: Vec<ChangeReason>,
    /// Effective enable for this frame
    pub enabled: bool,
    /// Effective enable of the previous frame
    pub previously_enabled: bool,
}

impl Evaluation {
    pub fn is_changed(&self) -> bool {
        self.decision == ChangeDecision::Changed
    }

    /// Block went from enabled to disabled this frame
    pub fn newly_disabled(&self) -> bool {
        self.previously_enabled && !self.enabled
    }
}

/// Cached detector state for one block
#[derive(Debug, Clone)]
pub struct DependencyTracker {
    block: BlockType,
    resolver: CalibrationResolver,
    calibration: Option<CalibrationRef>,
    record_enable: bool,
    configured_enable: bool,
    effective_enable: bool,
    feature_enables: Vec<bool>,
    cached_trigger: Option<TriggerSnapshot>,
}

impl DependencyTracker {
    /// New tracker; the block starts disabled
    pub fn new(block: BlockType) -> Self {
        Self {
            block,
            resolver: CalibrationResolver::new(block),
            calibration: None,
            record_enable: false,
            configured_enable: false,
            effective_enable: false,
            feature_enables: Vec::new(),
            cached_trigger: None,
        }
    }

    pub fn evaluate(&mut self, input: &DetectorInput<'_>, store: &dyn TuningStore) -> Evaluation {
        let previously_enabled = self.effective_enable;
        let mut reasons = Vec::new();

        let calibration_changed = self.refresh_calibration(store, input.selector);

        let configured = match input.manual {
            Some(manual) => {
                if manual.enable != self.configured_enable {
                    reasons.push(ChangeReason::ManualToggle);
                }
                if calibration_changed && manual.enable {
                    reasons.push(ChangeReason::CalibrationIdentity);
                }
                manual.enable
            }
            None => {
                if calibration_changed {
                    reasons.push(ChangeReason::CalibrationIdentity);
                }
                let mut configured = self.record_enable;
                if self.record_enable {
                    if self.apply_hysteresis(input.trigger) {
                        reasons.push(ChangeReason::FeatureToggle);
                    }
                    configured = self.feature_enables.is_empty()
                        || self.feature_enables.iter().any(|&on| on);
                }
                if configured != self.configured_enable && !calibration_changed {
                    reasons.push(ChangeReason::EnableToggle);
                }
                configured
            }
        };
        self.configured_enable = configured;

        if configured {
            match &self.cached_trigger {
                None => reasons.push(ChangeReason::FirstTrigger),
                Some(cached) => reasons.extend(
                    cached
                        .changed_fields(input.trigger)
                        .into_iter()
                        .map(ChangeReason::TriggerDelta),
                ),
            }
            self.cached_trigger = Some(*input.trigger);
        }

        let forced_off = input.controls.forces_disable(self.block);
        let enabled = configured && !forced_off;
        self.effective_enable = enabled;

        let decision = if !enabled {
            if configured && forced_off {
                reasons.push(ChangeReason::ForcedOff);
            }
            ChangeDecision::Unchanged
        } else if !previously_enabled {
            reasons.push(ChangeReason::Reenabled);
            ChangeDecision::Changed
        } else if reasons.is_empty() {
            ChangeDecision::Unchanged
        } else {
            ChangeDecision::Changed
        };

        Evaluation {
            decision,
            reasons,
            enabled,
            previously_enabled,
        }
    }

    /// Returns whether the calibration identity changed
    fn refresh_calibration(&mut self, store: &dyn TuningStore, selector: &TuningSelector) -> bool {
        let Resolution::Resolved(calibration) = self.resolver.resolve(store, selector) else {
            return false;
        };
        let same = self
            .calibration
            .as_ref()
            .is_some_and(|cached| cached.same_identity(&calibration));
        if same {
            return false;
        }

        tracing::debug!(
            "{}: calibration {:?} -> {:?}",
            self.block,
            self.calibration.as_ref().map(|c| c.id),
            calibration.id
        );
        self.record_enable = calibration.record.enable;
        self.feature_enables = calibration.record.features.iter().map(|f| f.enable).collect();
        self.calibration = Some(calibration);
        true
    }

    /// Returns whether any feature toggled
    fn apply_hysteresis(&mut self, trigger: &TriggerSnapshot) -> bool {
        let Some(calibration) = &self.calibration else {
            return false;
        };
        let mut toggled = false;
        for (feature, current) in calibration
            .record
            .features
            .iter()
            .zip(self.feature_enables.iter_mut())
        {
            if let Some(rule) = &feature.dynamic_enable {
                let next = dynamic_enable(rule, trigger, *current);
                if next != *current {
                    tracing::debug!(
                        "{}: feature {} {}",
                        self.block,
                        feature.name,
                        if next { "on" } else { "off" }
                    );
                    *current = next;
                    toggled = true;
                }
            }
        }
        toggled
    }

    pub fn block(&self) -> BlockType {
        self.block
    }

    /// Effective enable as of the last evaluation
    pub fn is_enabled(&self) -> bool {
        self.effective_enable
    }

    pub fn calibration(&self) -> Option<&CalibrationRef> {
        self.calibration.as_ref()
    }

    pub fn feature_enables(&self) -> &[bool] {
        &self.feature_enables
    }

    pub fn cached_trigger(&self) -> Option<&TriggerSnapshot> {
        self.cached_trigger.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_hw::{default_record, InMemoryTuningStore};
    use crate::backend::tuning::CalibrationRecord;
    use crate::types::NoiseReductionMode;
    use proptest::prelude::*;

    struct Frame {
        manual: Option<ManualIqSetting>,
        selector: TuningSelector,
        trigger: TriggerSnapshot,
        controls: FrameControls,
    }

    impl Frame {
        fn new() -> Self {
            Self {
                manual: None,
                selector: TuningSelector::default(),
                trigger: TriggerSnapshot::default(),
                controls: FrameControls::default(),
            }
        }

        fn input(&self) -> DetectorInput<'_> {
            DetectorInput {
                manual: self.manual,
                selector: &self.selector,
                trigger: &self.trigger,
                controls: &self.controls,
            }
        }
    }

    #[test]
    fn test_first_frame_enables_from_record() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Abf);
        assert!(!tracker.is_enabled());

        let eval = tracker.evaluate(&Frame::new().input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Changed);
        assert!(eval.enabled);
        assert!(!eval.previously_enabled);
        assert!(eval.reasons.contains(&ChangeReason::CalibrationIdentity));
        assert!(eval.reasons.contains(&ChangeReason::Reenabled));
    }

    #[test]
    fn test_identical_frame_is_unchanged() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Abf);
        let frame = Frame::new();
        tracker.evaluate(&frame.input(), &store);

        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Unchanged);
        assert!(eval.enabled);
        assert!(eval.reasons.is_empty());
        assert_eq!(store.resolve_calls(), 1);
    }

    #[test]
    fn test_trigger_delta_is_changed() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Gamma);
        let mut frame = Frame::new();
        tracker.evaluate(&frame.input(), &store);

        frame.trigger.color_temperature = 3200.0;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Changed);
        assert_eq!(
            eval.reasons,
            vec![ChangeReason::TriggerDelta(ControlVariable::ColorTemperature)]
        );
        assert_eq!(tracker.cached_trigger().unwrap().color_temperature, 3200.0);
    }

    #[test]
    fn test_manual_override_is_authoritative() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Abf);
        let mut frame = Frame::new();
        tracker.evaluate(&frame.input(), &store);

        frame.manual = Some(ManualIqSetting { enable: false });
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Unchanged);
        assert!(!eval.enabled);
        assert!(eval.newly_disabled());

        // Trigger movement under a manual disable changes nothing
        frame.trigger.aec_gain = 8.0;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Unchanged);
        assert!(!eval.enabled);

        frame.manual = Some(ManualIqSetting { enable: true });
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Changed);
        assert!(eval.reasons.contains(&ChangeReason::ManualToggle));
    }

    #[test]
    fn test_manual_skips_hysteresis() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Abf);
        let mut frame = Frame::new();
        frame.manual = Some(ManualIqSetting { enable: true });
        tracker.evaluate(&frame.input(), &store);
        let before = tracker.feature_enables().to_vec();

        frame.trigger.aec_gain = 6.0;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(tracker.feature_enables(), before.as_slice());
        assert!(!eval.reasons.contains(&ChangeReason::FeatureToggle));
    }

    #[test]
    fn test_hysteresis_toggle_is_changed() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Abf);
        let mut frame = Frame::new();
        tracker.evaluate(&frame.input(), &store);
        assert_eq!(tracker.feature_enables(), &[true, true, false]);

        frame.trigger.aec_gain = 4.0;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert!(eval.reasons.contains(&ChangeReason::FeatureToggle));
        assert_eq!(tracker.feature_enables(), &[true, true, true]);

        // Back into the deadband: the feature stays on
        frame.trigger.aec_gain = 3.0;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert!(!eval.reasons.contains(&ChangeReason::FeatureToggle));
        assert_eq!(tracker.feature_enables(), &[true, true, true]);
    }

    #[test]
    fn test_all_features_off_disables_module() {
        let store = InMemoryTuningStore::new();
        let mut record = default_record(BlockType::Abf);
        for feature in &mut record.features {
            feature.enable = false;
        }
        store.insert(BlockType::Abf, TuningSelector::default(), record);

        let mut tracker = DependencyTracker::new(BlockType::Abf);
        let eval = tracker.evaluate(&Frame::new().input(), &store);
        assert!(!eval.enabled);
        assert_eq!(eval.decision, ChangeDecision::Unchanged);
    }

    #[test]
    fn test_frame_control_forces_off_then_reenables() {
        let store = InMemoryTuningStore::with_defaults();
        let mut tracker = DependencyTracker::new(BlockType::Abf);
        let mut frame = Frame::new();
        tracker.evaluate(&frame.input(), &store);

        frame.controls.noise_reduction = NoiseReductionMode::Off;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Unchanged);
        assert!(!eval.enabled);
        assert_eq!(eval.reasons, vec![ChangeReason::ForcedOff]);

        frame.controls.noise_reduction = NoiseReductionMode::Fast;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert_eq!(eval.decision, ChangeDecision::Changed);
        assert_eq!(eval.reasons, vec![ChangeReason::Reenabled]);
    }

    #[test]
    fn test_selector_change_with_new_identity() {
        let store = InMemoryTuningStore::with_defaults();
        let night = TuningSelector {
            scene: 2,
            ..Default::default()
        };
        store.insert(
            BlockType::Lsc,
            night,
            CalibrationRecord {
                enable: false,
                ..default_record(BlockType::Lsc)
            },
        );

        let mut tracker = DependencyTracker::new(BlockType::Lsc);
        let mut frame = Frame::new();
        assert!(tracker.evaluate(&frame.input(), &store).enabled);

        frame.selector = night;
        let eval = tracker.evaluate(&frame.input(), &store);
        assert!(!eval.enabled);
        assert!(eval.newly_disabled());
        assert_eq!(store.resolve_calls(), 2);
    }

    #[test]
    fn test_no_calibration_stays_disabled() {
        let store = InMemoryTuningStore::new();
        let mut tracker = DependencyTracker::new(BlockType::Gic);
        let eval = tracker.evaluate(&Frame::new().input(), &store);
        assert!(!eval.enabled);
        assert!(tracker.calibration().is_none());
    }

    fn arb_frame() -> impl Strategy<Value = Frame> {
        (
            prop::option::of(any::<bool>()),
            0u16..3,
            prop::sample::select(vec![1.0f32, 2.5, 4.0, 6.0]),
            prop::sample::select(vec![2800.0f32, 5000.0]),
            any::<bool>(),
        )
            .prop_map(|(manual, scene, gain, cct, nr_off)| {
                let mut frame = Frame::new();
                frame.manual = manual.map(|enable| ManualIqSetting { enable });
                frame.selector.scene = scene;
                frame.trigger.aec_gain = gain;
                frame.trigger.color_temperature = cct;
                if nr_off {
                    frame.controls.noise_reduction = NoiseReductionMode::Off;
                }
                frame
            })
    }

    impl std::fmt::Debug for Frame {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Frame")
                .field("manual", &self.manual)
                .field("scene", &self.selector.scene)
                .field("gain", &self.trigger.aec_gain)
                .field("nr", &self.controls.noise_reduction)
                .finish()
        }
    }

    proptest! {
        #[test]
        fn prop_repeated_input_is_unchanged(
            history in prop::collection::vec(arb_frame(), 0..12),
            last in arb_frame(),
        ) {
            let store = InMemoryTuningStore::with_defaults();
            let mut tracker = DependencyTracker::new(BlockType::Abf);
            for frame in &history {
                tracker.evaluate(&frame.input(), &store);
            }
            let first = tracker.evaluate(&last.input(), &store);
            let second = tracker.evaluate(&last.input(), &store);
            prop_assert_eq!(second.decision, ChangeDecision::Unchanged);
            prop_assert_eq!(second.enabled, first.enabled);
        }

        #[test]
        fn prop_same_sequence_same_decisions(frames in prop::collection::vec(arb_frame(), 1..16)) {
            let store = InMemoryTuningStore::with_defaults();
            let mut a = DependencyTracker::new(BlockType::Abf);
            let mut b = DependencyTracker::new(BlockType::Abf);
            for frame in &frames {
                let ea = a.evaluate(&frame.input(), &store);
                let eb = b.evaluate(&frame.input(), &store);
                prop_assert_eq!(ea, eb);
            }
        }

        #[test]
        fn prop_manual_false_never_enables(frames in prop::collection::vec(arb_frame(), 1..16)) {
            let store = InMemoryTuningStore::with_defaults();
            let mut tracker = DependencyTracker::new(BlockType::Abf);
            for mut frame in frames {
                frame.manual = Some(ManualIqSetting { enable: false });
                let eval = tracker.evaluate(&frame.input(), &store);
                prop_assert!(!eval.enabled);
                prop_assert_eq!(eval.decision, ChangeDecision::Unchanged);
            }
        }
    }
}
