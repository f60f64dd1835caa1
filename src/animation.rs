use log::trace;

use crate::material::InstanceSet;

/// Shared time accumulator for one instance set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationDriver {
    elapsed: f32,
}

impl AnimationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advances the accumulator by `delta` seconds and writes it into every
    /// instance. Zero, negative and non-finite deltas leave everything as is.
    pub fn tick(&mut self, delta: f32, instances: &mut InstanceSet) {
        if !(delta.is_finite() && delta > 0.0) {
            if delta != 0.0 {
                trace!("ignoring frame delta {delta}");
            }
            return;
        }
        self.elapsed += delta;
        instances.write_time(self.elapsed);
    }
}

/// Converts host timestamps (seconds) into per-frame deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    last: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous call; zero on the first call or when the
    /// host clock goes backwards.
    pub fn delta(&mut self, now: f64) -> f32 {
        let delta = match self.last {
            Some(last) if now > last => (now - last) as f32,
            _ => 0.0,
        };
        self.last = Some(now);
        delta
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::HologramParameters;

    #[test]
    fn zero_tick_leaves_time_untouched() {
        let mut set = InstanceSet::new(&HologramParameters::default());
        let mut driver = AnimationDriver::new();
        let revision = set.canonical().revision();
        driver.tick(0.0, &mut set);
        assert_eq!(set.canonical().time(), 0.0);
        assert_eq!(set.canonical().revision(), revision);
    }

    #[test]
    fn ticks_accumulate_into_every_instance() {
        let mut set = InstanceSet::new(&HologramParameters::default());
        set.spawn_clone();
        let mut driver = AnimationDriver::new();
        driver.tick(0.25, &mut set);
        driver.tick(0.5, &mut set);
        assert_eq!(driver.elapsed(), 0.75);
        assert!(set.iter().all(|instance| instance.time() == 0.75));
    }

    #[test]
    fn bad_deltas_are_ignored() {
        let mut set = InstanceSet::new(&HologramParameters::default());
        let mut driver = AnimationDriver::new();
        driver.tick(-1.0, &mut set);
        driver.tick(f32::NAN, &mut set);
        assert_eq!(driver.elapsed(), 0.0);
    }

    #[test]
    fn clock_reports_zero_on_first_frame() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.delta(10.0), 0.0);
        assert_eq!(clock.delta(10.5), 0.5);
        assert_eq!(clock.delta(10.25), 0.0);
        clock.reset();
        assert_eq!(clock.delta(20.0), 0.0);
    }
}
