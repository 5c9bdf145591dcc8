//! Dynamic enable with a deadband.
//!
//! A feature governed by a [`HysteresisTrigger`] switches state only when the
//! trigger leaves the `[start, end]` band on the appropriate side. Inside the
//! band the previous state is kept, so a trigger oscillating near one bound
//! does not make the feature flicker.

use crate::backend::tuning::{HysteresisDirection, HysteresisTrigger};
use crate::types::TriggerSnapshot;

/// Evaluate a hysteresis trigger against a snapshot.
///
/// - `Upward`: on at `value >= end`, off at `value < start`
/// - `Downward`: off at `value > end`, on at `value <= start`
///
/// Anything else (including NaN) keeps `current`.
pub fn dynamic_enable(trigger: &HysteresisTrigger, snapshot: &TriggerSnapshot, current: bool) -> bool {
    let value = snapshot.value(trigger.control);
    match trigger.direction {
        HysteresisDirection::Upward => {
            if value >= trigger.end {
                true
            } else if value < trigger.start {
                false
            } else {
                current
            }
        }
        HysteresisDirection::Downward => {
            if value > trigger.end {
                false
            } else if value <= trigger.start {
                true
            } else {
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlVariable;
    use proptest::prelude::*;

    fn gain_trigger(direction: HysteresisDirection) -> HysteresisTrigger {
        HysteresisTrigger {
            control: ControlVariable::Gain,
            direction,
            start: 2.0,
            end: 4.0,
        }
    }

    fn at_gain(gain: f32) -> TriggerSnapshot {
        TriggerSnapshot {
            aec_gain: gain,
            ..Default::default()
        }
    }

    #[test]
    fn test_upward() {
        let t = gain_trigger(HysteresisDirection::Upward);
        assert!(!dynamic_enable(&t, &at_gain(1.0), true));
        assert!(dynamic_enable(&t, &at_gain(4.0), false));
        assert!(dynamic_enable(&t, &at_gain(3.0), true));
        assert!(!dynamic_enable(&t, &at_gain(3.0), false));
        assert!(dynamic_enable(&t, &at_gain(2.0), true));
    }

    #[test]
    fn test_downward() {
        let t = gain_trigger(HysteresisDirection::Downward);
        assert!(dynamic_enable(&t, &at_gain(2.0), false));
        assert!(!dynamic_enable(&t, &at_gain(4.5), true));
        assert!(dynamic_enable(&t, &at_gain(4.0), true));
        assert!(!dynamic_enable(&t, &at_gain(3.0), false));
    }

    #[test]
    fn test_oscillation_near_bound_does_not_flicker() {
        let t = gain_trigger(HysteresisDirection::Upward);
        let mut state = false;
        state = dynamic_enable(&t, &at_gain(4.1), state);
        assert!(state);
        for gain in [3.9, 4.0, 3.8, 4.2, 3.95] {
            state = dynamic_enable(&t, &at_gain(gain), state);
            assert!(state);
        }
    }

    #[test]
    fn test_nan_keeps_state() {
        let t = gain_trigger(HysteresisDirection::Upward);
        assert!(dynamic_enable(&t, &at_gain(f32::NAN), true));
        assert!(!dynamic_enable(&t, &at_gain(f32::NAN), false));
    }

    proptest! {
        #[test]
        fn prop_deadband_keeps_state(gain in 2.0f32..4.0, current in any::<bool>(), upward in any::<bool>()) {
            let direction = if upward {
                HysteresisDirection::Upward
            } else {
                HysteresisDirection::Downward
            };
            let t = gain_trigger(direction);
            // Exclusive of the bound that switches for each direction
            prop_assume!(if upward { gain < 4.0 } else { gain > 2.0 });
            prop_assert_eq!(dynamic_enable(&t, &at_gain(gain), current), current);
        }

        #[test]
        fn prop_evaluation_is_idempotent(gain in 0.0f32..8.0, current in any::<bool>()) {
            let t = gain_trigger(HysteresisDirection::Upward);
            let once = dynamic_enable(&t, &at_gain(gain), current);
            let twice = dynamic_enable(&t, &at_gain(gain), once);
            prop_assert_eq!(once, twice);
        }
    }
}
