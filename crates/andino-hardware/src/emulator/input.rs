//! Debounced digital input with hold detection.

use std::time::Duration;

use andino_core::constants::COUNTER_MODULUS;
use tokio::time::Instant;

/// What one sample of an input produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample {
    /// The debounced state flipped to this value.
    pub changed: Option<bool>,
    /// The input has now been active for the hold time.
    pub held: bool,
}

/// Model of one input pin.
///
/// A raw level change is only committed once it has been stable for the
/// debounce time. A committed active state that lasts for the hold time
/// counts once; the input must go inactive before it can count again.
#[derive(Debug, Clone)]
pub struct InputDevice {
    pin: u32,
    pull_up: bool,
    debounce: Duration,
    hold: Duration,
    counter: u32,
    active: bool,
    candidate: Option<(bool, Instant)>,
    active_since: Option<Instant>,
    hold_reported: bool,
}

impl InputDevice {
    pub fn new(pin: u32, pull_up: bool, debounce: Duration, hold: Duration) -> Self {
        Self {
            pin,
            pull_up,
            debounce,
            hold,
            counter: 0,
            active: false,
            candidate: None,
            active_since: None,
            hold_reported: false,
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Debounced state.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }

    pub fn set_pull_up(&mut self, pull_up: bool) {
        self.pull_up = pull_up;
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    pub fn set_hold(&mut self, hold: Duration) {
        self.hold = hold;
    }

    /// Feed the raw pin level read at `now`.
    pub fn sample(&mut self, level: bool, now: Instant) -> Sample {
        let mut result = Sample::default();
        // Pull-up inputs are active low.
        let raw_active = level != self.pull_up;

        if raw_active == self.active {
            self.candidate = None;
        } else {
            let since = match self.candidate {
                Some((state, since)) if state == raw_active => since,
                _ => {
                    self.candidate = Some((raw_active, now));
                    now
                }
            };
            if now.saturating_duration_since(since) >= self.debounce {
                self.commit(raw_active, now);
                result.changed = Some(raw_active);
            }
        }

        if self.active
            && !self.hold_reported
            && let Some(since) = self.active_since
            && now.saturating_duration_since(since) >= self.hold
        {
            self.hold_reported = true;
            self.counter = (self.counter + 1) % COUNTER_MODULUS;
            result.held = true;
        }

        result
    }

    fn commit(&mut self, active: bool, now: Instant) {
        self.active = active;
        self.candidate = None;
        if active {
            self.active_since = Some(now);
            self.hold_reported = false;
        } else {
            self.active_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_bounce_shorter_than_debounce_is_ignored() {
        let t0 = Instant::now();
        let mut input = InputDevice::new(5, false, ms(10), ms(50));

        assert_eq!(input.sample(true, t0), Sample::default());
        assert_eq!(input.sample(false, t0 + ms(4)), Sample::default());
        assert_eq!(input.sample(true, t0 + ms(8)), Sample::default());
        assert_eq!(input.sample(true, t0 + ms(15)), Sample::default());
        assert!(!input.is_active());

        let s = input.sample(true, t0 + ms(18));
        assert_eq!(s.changed, Some(true));
        assert!(input.is_active());
    }

    #[test]
    fn test_hold_counts_once_per_activation() {
        let t0 = Instant::now();
        let mut input = InputDevice::new(5, false, Duration::ZERO, ms(20));

        assert_eq!(input.sample(true, t0).changed, Some(true));
        assert!(!input.sample(true, t0 + ms(10)).held);
        assert!(input.sample(true, t0 + ms(20)).held);
        assert!(!input.sample(true, t0 + ms(100)).held);
        assert_eq!(input.counter(), 1);

        assert_eq!(input.sample(false, t0 + ms(110)).changed, Some(false));
        input.sample(true, t0 + ms(120));
        assert!(input.sample(true, t0 + ms(140)).held);
        assert_eq!(input.counter(), 2);
    }

    #[test]
    fn test_short_press_does_not_count() {
        let t0 = Instant::now();
        let mut input = InputDevice::new(5, false, Duration::ZERO, ms(50));
        input.sample(true, t0);
        input.sample(false, t0 + ms(10));
        assert_eq!(input.counter(), 0);
    }

    #[rstest]
    #[case::active_high_raised(false, true, Some(true))]
    #[case::active_high_idle(false, false, None)]
    #[case::pull_up_pulled_low(true, false, Some(true))]
    #[case::pull_up_idle(true, true, None)]
    fn test_polarity(#[case] pull_up: bool, #[case] level: bool, #[case] changed: Option<bool>) {
        let mut input = InputDevice::new(5, pull_up, Duration::ZERO, ms(50));
        assert_eq!(input.sample(level, Instant::now()).changed, changed);
        assert_eq!(input.is_active(), changed.is_some());
    }

    #[test]
    fn test_counter_wraps() {
        let t0 = Instant::now();
        let mut input = InputDevice::new(5, false, Duration::ZERO, Duration::ZERO);
        input.counter = COUNTER_MODULUS - 1;
        assert!(input.sample(true, t0).held);
        assert_eq!(input.counter(), 0);
    }

    proptest! {
        /// Changes alternate and end on the last stable level.
        #[test]
        fn prop_changes_alternate(levels in prop::collection::vec(any::<bool>(), 1..64)) {
            let t0 = Instant::now();
            let mut input = InputDevice::new(1, false, Duration::ZERO, ms(1000));
            let mut last = false;
            for (i, level) in levels.iter().enumerate() {
                let s = input.sample(*level, t0 + ms(i as u64));
                if let Some(state) = s.changed {
                    prop_assert_ne!(state, last);
                    last = state;
                }
            }
            prop_assert_eq!(input.is_active(), *levels.last().unwrap());
        }
    }
}
