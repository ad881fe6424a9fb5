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

//! A reservoir implementing Vitter's Algorithm R uniform reservoir sampling.

use crate::reservoir::{Reservoir, ReservoirDescriptor};
use parking_lot::Mutex;
use rand::Rng;

/// The default reservoir capacity, offering a 99.9% confidence level with a 5%
/// margin of error.
pub const DEFAULT_CAPACITY: usize = 1028;

struct State {
    values: Vec<f64>,
    // total number of values ever offered to the reservoir.
    count: u64,
}

/// A reservoir which uniformly samples from all values ever added to it.
///
/// Every value added to the reservoir has an equal probability of being retained,
/// regardless of how long ago it was added, implemented with [Vitter's Algorithm
/// R](https://en.wikipedia.org/wiki/Reservoir_sampling#Simple_algorithm): after `k`
/// values have been offered, each of the first `k` values is present in the
/// reservoir with probability `min(1, capacity / k)`.
pub struct UniformReservoir {
    capacity: usize,
    state: Mutex<State>,
}

impl Default for UniformReservoir {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformReservoir {
    /// Creates a new reservoir with the [default capacity](DEFAULT_CAPACITY).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new reservoir with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "reservoir capacity must be nonzero");
        UniformReservoir {
            capacity,
            state: Mutex::new(State {
                values: Vec::with_capacity(capacity),
                count: 0,
            }),
        }
    }
}

impl Reservoir for UniformReservoir {
    fn update(&self, value: f64) {
        let mut state = self.state.lock();
        let k = state.count;

        if (k as usize) < self.capacity {
            state.values.push(value);
        } else {
            let j = rand::thread_rng().gen_range(0..=k);
            if (j as usize) < self.capacity {
                state.values[j as usize] = value;
            }
        }

        state.count += 1;
    }

    fn current_values(&self) -> Vec<f64> {
        self.state.lock().values.clone()
    }

    fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    fn descriptor(&self) -> ReservoirDescriptor {
        ReservoirDescriptor::Uniform {
            capacity: self.capacity,
        }
    }
}
