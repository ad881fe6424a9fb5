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

//! A reservoir retaining the last `N` values added to it.

use crate::reservoir::{Reservoir, ReservoirDescriptor};
use parking_lot::Mutex;

struct State {
    values: Vec<f64>,
    write_index: usize,
}

/// A reservoir which retains the most recently added `window_size` values.
///
/// Implemented as a ring buffer: once the buffer fills, each new value overwrites
/// the oldest retained one.
pub struct SlidingWindowReservoir {
    window_size: usize,
    state: Mutex<State>,
}

impl SlidingWindowReservoir {
    /// Creates a new reservoir retaining the last `window_size` values.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "window size must be nonzero");
        SlidingWindowReservoir {
            window_size,
            state: Mutex::new(State {
                values: Vec::with_capacity(window_size),
                write_index: 0,
            }),
        }
    }
}

impl Reservoir for SlidingWindowReservoir {
    fn update(&self, value: f64) {
        let mut state = self.state.lock();

        if state.values.len() < self.window_size {
            state.values.push(value);
        } else {
            state.values[state.write_index] = value;
        }
        state.write_index = (state.write_index + 1) % self.window_size;
    }

    fn current_values(&self) -> Vec<f64> {
        self.state.lock().values.clone()
    }

    fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    fn descriptor(&self) -> ReservoirDescriptor {
        ReservoirDescriptor::SlidingWindow {
            window_size: self.window_size,
        }
    }
}
