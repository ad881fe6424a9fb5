// Copyright 2019 Palantir Technologies, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A metric tracking the duration of the most recently completed operation.

use crate::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// A metric which records the elapsed time, in seconds, of the most recently
/// completed operation.
///
/// Unlike a Dropwizard-style timer, this is not a histogram-backed rate and
/// duration metric; it holds a single scalar value, the duration of the last
/// `start`/`stop` pair (or [`measure`](Timer::measure) call) to complete,
/// initially `0`. Pair a timer with a [`Histogram`](crate::Histogram) under a
/// separate name if a distribution of durations is also wanted.
pub struct Timer {
    clock: Arc<dyn Clock>,
    value: Mutex<f64>,
    running: Mutex<Option<Instant>>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a new timer using the system clock.
    pub fn new() -> Self {
        Self::new_with(crate::clock::SYSTEM_CLOCK.clone())
    }

    /// Creates a new timer using the provided [`Clock`] as its time source.
    pub fn new_with(clock: Arc<dyn Clock>) -> Self {
        Timer {
            clock,
            value: Mutex::new(0.),
            running: Mutex::new(None),
        }
    }

    /// Marks the start of a timed operation.
    ///
    /// A second call to `start` before a matching [`stop`](Timer::stop) simply
    /// discards the first start time.
    pub fn start(&self) {
        *self.running.lock() = Some(self.clock.now());
    }

    /// Marks the end of a timed operation begun with [`start`](Timer::start),
    /// recording the elapsed duration in seconds.
    ///
    /// Does nothing if `start` was never called.
    pub fn stop(&self) {
        let now = self.clock.now();
        if let Some(start) = self.running.lock().take() {
            *self.value.lock() = now.duration_since(start).as_secs_f64();
        }
    }

    /// Records an explicit duration, in seconds, without a matching
    /// `start`/`stop` pair.
    pub fn update(&self, seconds: f64) {
        *self.value.lock() = seconds;
    }

    /// Runs `f`, recording its wall-clock duration, and returns its result.
    ///
    /// The duration is recorded even if this call overwrites a duration from an
    /// operation already in flight via [`start`](Timer::start); the two mechanisms
    /// share the same recorded value.
    pub fn measure<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = self.clock.now();
        let result = f();
        *self.value.lock() = self.clock.now().duration_since(start).as_secs_f64();
        result
    }

    /// Returns a guard which records the elapsed time when it is dropped.
    pub fn time(&self) -> Time<'_> {
        Time {
            timer: self,
            start: self.clock.now(),
        }
    }

    /// Returns the duration, in seconds, of the most recently completed
    /// operation, or `0` if none has completed yet.
    pub fn value(&self) -> f64 {
        *self.value.lock()
    }
}

/// A guard type which reports the time elapsed since its creation to a timer when
/// it drops.
pub struct Time<'a> {
    timer: &'a Timer,
    start: Instant,
}

impl Drop for Time<'_> {
    fn drop(&mut self) {
        let elapsed = self.timer.clock.now().duration_since(self.start).as_secs_f64();
        *self.timer.value.lock() = elapsed;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::test::TestClock;
    use std::time::Duration;

    #[test]
    fn starts_with_zero_value() {
        let timer = Timer::new();
        assert_eq!(timer.value(), 0.);
    }

    #[test]
    fn start_stop_records_elapsed_seconds() {
        let clock = Arc::new(TestClock::new());
        let timer = Timer::new_with(clock.clone());

        timer.start();
        clock.advance(Duration::from_millis(1500));
        timer.stop();

        assert_eq!(timer.value(), 1.5);
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let timer = Timer::new();
        timer.stop();
        assert_eq!(timer.value(), 0.);
    }

    #[test]
    fn measure_records_the_callables_duration() {
        let clock = Arc::new(TestClock::new());
        let timer = Timer::new_with(clock.clone());

        let result = timer.measure(|| {
            clock.advance(Duration::from_secs(2));
            "done"
        });

        assert_eq!(result, "done");
        assert_eq!(timer.value(), 2.0);
    }

    #[test]
    fn time_guard_records_on_drop() {
        let clock = Arc::new(TestClock::new());
        let timer = Timer::new_with(clock.clone());

        {
            let _guard = timer.time();
            clock.advance(Duration::from_millis(250));
        }

        assert_eq!(timer.value(), 0.25);
    }

    #[test]
    fn a_later_value_replaces_an_earlier_one() {
        let timer = Timer::new();
        timer.update(1.0);
        timer.update(2.0);
        assert_eq!(timer.value(), 2.0);
    }
}
