// Copyright 2024 Palantir Technologies, Inc.
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

//! A reservoir which exponentially weights in favor of recent values.
//!
//! This is a forward-decaying priority sample, as described by Cormode, Shkapenyuk,
//! Srivastava and Xu in ["Forward Decay: A Practical Time Decay Model for Streaming
//! Systems"](http://dimacs.rutgers.edu/~graham/pubs/papers/fwddecay.pdf), following
//! the same design as the `ExponentiallyDecayingReservoir` in the Java Dropwizard
//! Metrics library.

use crate::reservoir::{Reservoir, ReservoirDescriptor};
use crate::Clock;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rand::distributions::OpenClosed01;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The default reservoir capacity.
pub const DEFAULT_CAPACITY: usize = 1028;

/// The default decay factor, which heavily biases towards the last five minutes of
/// values.
pub const DEFAULT_ALPHA: f64 = 0.015;

/// The default interval between priority rescales.
pub const DEFAULT_RESCALE_INTERVAL: Duration = Duration::from_secs(60 * 60);

struct State {
    // keyed by priority.
    values: BTreeMap<OrderedFloat<f64>, f64>,
    start_time: Instant,
    next_rescale: Instant,
}

/// A reservoir which exponentially weights in favor of recently added values.
///
/// Rather than storing every value, the reservoir retains a randomized subset of
/// bounded size, weighted by a forward-decaying priority so that recent values are
/// exponentially more likely to be retained than old ones. Priorities are
/// periodically rescaled to prevent floating point overflow during long-running,
/// low-traffic processes.
pub struct ExponentiallyDecayingReservoir {
    capacity: usize,
    alpha: f64,
    rescale_interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Default for ExponentiallyDecayingReservoir {
    fn default() -> Self {
        Self::new()
    }
}

impl ExponentiallyDecayingReservoir {
    /// Creates a new reservoir with the default capacity and alpha, using the
    /// system clock.
    pub fn new() -> Self {
        Self::with_capacity_and_alpha(DEFAULT_CAPACITY, DEFAULT_ALPHA)
    }

    /// Creates a new reservoir with the given capacity and decay factor, using the
    /// system clock.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_alpha(capacity: usize, alpha: f64) -> Self {
        Self::new_with(
            capacity,
            alpha,
            DEFAULT_RESCALE_INTERVAL,
            crate::clock::SYSTEM_CLOCK.clone(),
        )
    }

    /// Creates a new reservoir using the provided [`Clock`] as its time source and
    /// rescale interval.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new_with(
        capacity: usize,
        alpha: f64,
        rescale_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        assert!(capacity > 0, "reservoir capacity must be nonzero");
        let now = clock.now();
        ExponentiallyDecayingReservoir {
            capacity,
            alpha,
            rescale_interval,
            clock,
            state: Mutex::new(State {
                values: BTreeMap::new(),
                start_time: now,
                next_rescale: now + rescale_interval,
            }),
        }
    }

    fn weight(&self, now: Instant, start_time: Instant) -> f64 {
        (self.alpha * now.duration_since(start_time).as_secs_f64()).exp()
    }

    fn rescale_if_needed(&self, state: &mut State, now: Instant) {
        if now < state.next_rescale {
            return;
        }

        state.next_rescale = now + self.rescale_interval;
        let old_start_time = state.start_time;
        state.start_time = now;
        let scaling_factor =
            (-self.alpha * now.duration_since(old_start_time).as_secs_f64()).exp();

        state.values = state
            .values
            .iter()
            .map(|(&priority, &value)| {
                (OrderedFloat(priority.into_inner() * scaling_factor), value)
            })
            .collect();
    }
}

impl Reservoir for ExponentiallyDecayingReservoir {
    fn update(&self, value: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.rescale_if_needed(&mut state, now);

        let weight = self.weight(now, state.start_time);
        // sampled from (0, 1] so we never divide by zero.
        let u: f64 = rand::thread_rng().sample(OpenClosed01);
        let priority = OrderedFloat(weight / u);

        if state.values.len() < self.capacity {
            state.values.insert(priority, value);
        } else if let Some((&lowest, _)) = state.values.iter().next() {
            if lowest < priority {
                state.values.insert(priority, value);
                state.values.remove(&lowest);
            }
        }
    }

    fn current_values(&self) -> Vec<f64> {
        self.state.lock().values.values().copied().collect()
    }

    fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    fn descriptor(&self) -> ReservoirDescriptor {
        ReservoirDescriptor::ExponentiallyDecaying {
            capacity: self.capacity,
            alpha: self.alpha,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::test::TestClock;

    #[test]
    fn never_exceeds_capacity() {
        let reservoir = ExponentiallyDecayingReservoir::with_capacity_and_alpha(100, 0.015);
        for i in 0..1000 {
            reservoir.update(i as f64);
        }

        assert_eq!(reservoir.len(), 100);
    }

    #[test]
    fn rescale_keeps_priorities_finite() {
        let clock = Arc::new(TestClock::new());
        let reservoir = ExponentiallyDecayingReservoir::new_with(
            10,
            0.015,
            Duration::from_secs(3600),
            clock.clone(),
        );

        for i in 0..100 {
            reservoir.update(i as f64);
        }

        // simulate 15 hours of inactivity, forcing several rescales.
        clock.advance(Duration::from_secs(15 * 3600));
        reservoir.update(1000.0);

        assert!(reservoir.len() <= 10);
        for value in reservoir.current_values() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn recent_values_dominate_after_a_spike() {
        let clock = Arc::new(TestClock::new());
        let reservoir = ExponentiallyDecayingReservoir::new_with(
            1000,
            0.015,
            Duration::from_secs(3600),
            clock.clone(),
        );

        for _ in 0..(120 * 10) {
            reservoir.update(177.0);
            clock.advance(Duration::from_secs(6));
        }

        for _ in 0..(10 * 10) {
            reservoir.update(9999.0);
            clock.advance(Duration::from_secs(6));
        }

        let values = reservoir.current_values();
        let median = {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            sorted[sorted.len() / 2]
        };
        assert_eq!(median, 9999.0);
    }
}
