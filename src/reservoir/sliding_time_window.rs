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

//! A reservoir retaining values added within a trailing time window.

use crate::reservoir::{Reservoir, ReservoirDescriptor};
use crate::Clock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct State {
    // ordered by timestamp, oldest first.
    entries: VecDeque<(Instant, f64)>,
}

/// A reservoir which retains every value added within a trailing window of time.
///
/// Entries older than the window are evicted both eagerly, on every
/// [`update`](Reservoir::update), and lazily, on every
/// [`current_values`](Reservoir::current_values) call — so a reservoir that has
/// gone quiet still reports an empty set once its last entry ages out, even though
/// nothing has been added since.
///
/// An entry exactly `window` old is considered expired: only entries strictly
/// newer than `now - window` are retained.
pub struct SlidingTimeWindowReservoir {
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl SlidingTimeWindowReservoir {
    /// Creates a new reservoir retaining values added in the last `window` using
    /// the system clock.
    pub fn new(window: Duration) -> Self {
        Self::new_with(window, crate::clock::SYSTEM_CLOCK.clone())
    }

    /// Creates a new reservoir using the provided [`Clock`] as its time source.
    pub fn new_with(window: Duration, clock: Arc<dyn Clock>) -> Self {
        SlidingTimeWindowReservoir {
            window,
            clock,
            state: Mutex::new(State {
                entries: VecDeque::new(),
            }),
        }
    }

    fn evict(&self, state: &mut State, now: Instant) {
        while let Some(&(t, _)) = state.entries.front() {
            if now.duration_since(t) >= self.window {
                state.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Reservoir for SlidingTimeWindowReservoir {
    fn update(&self, value: f64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.entries.push_back((now, value));
        self.evict(&mut state, now);
    }

    fn current_values(&self) -> Vec<f64> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.evict(&mut state, now);
        state.entries.iter().map(|&(_, v)| v).collect()
    }

    fn len(&self) -> usize {
        self.current_values().len()
    }

    fn descriptor(&self) -> ReservoirDescriptor {
        ReservoirDescriptor::SlidingTimeWindow {
            window: self.window,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::test::TestClock;
    use std::collections::HashSet;

    #[test]
    fn evicts_entries_older_than_the_window() {
        let clock = Arc::new(TestClock::new());
        let reservoir = SlidingTimeWindowReservoir::new_with(Duration::from_secs(10), clock.clone());

        for t in 0..=15 {
            reservoir.update(t as f64);
            if t < 15 {
                clock.advance(Duration::from_secs(1));
            }
        }

        let values = reservoir
            .current_values()
            .into_iter()
            .map(|v| v as i64)
            .collect::<HashSet<_>>();
        assert_eq!(values, (6..=15).collect());
    }

    #[test]
    fn quiet_reservoir_empties_out_without_new_writes() {
        let clock = Arc::new(TestClock::new());
        let reservoir = SlidingTimeWindowReservoir::new_with(Duration::from_secs(5), clock.clone());

        reservoir.update(1.0);
        assert_eq!(reservoir.len(), 1);

        clock.advance(Duration::from_secs(10));
        assert_eq!(reservoir.current_values(), Vec::<f64>::new());
    }
}
