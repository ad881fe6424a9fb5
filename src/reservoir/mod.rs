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

//! Bounded sample stores with various retention policies, feeding a [`Histogram`](crate::Histogram).

pub use crate::reservoir::exponentially_decaying::ExponentiallyDecayingReservoir;
pub use crate::reservoir::sliding_time_window::SlidingTimeWindowReservoir;
pub use crate::reservoir::sliding_window::SlidingWindowReservoir;
pub use crate::reservoir::uniform::UniformReservoir;
use std::time::Duration;

pub mod exponentially_decaying;
pub mod sliding_time_window;
pub mod sliding_window;
pub mod uniform;

/// A statistically representative subset of a set of values.
pub trait Reservoir: 'static + Sync + Send {
    /// Adds a value to the reservoir.
    fn update(&self, value: f64);

    /// Returns the values currently retained by the reservoir.
    ///
    /// The returned vector is a defensive copy taken under the reservoir's own
    /// lock; callers compute statistics over it without holding any lock, per the
    /// "snapshot copy-out" rule of the crate's concurrency model.
    fn current_values(&self) -> Vec<f64>;

    /// Returns the number of values currently retained by the reservoir.
    fn len(&self) -> usize;

    /// Returns `true` if the reservoir currently retains no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a descriptor identifying the reservoir's kind and configured
    /// parameters.
    ///
    /// Two reservoirs are the same kind, for the purpose of the registry's
    /// duplicate-registration check, iff their descriptors are equal.
    fn descriptor(&self) -> ReservoirDescriptor;
}

/// A reservoir's kind tag and constructor parameters.
///
/// Used by the registry (and the [`timed`](crate::timed) decorator) to detect
/// whether a pre-registered histogram's reservoir is compatible with a requested
/// one. Floating-point parameters (such as the exponentially-decaying reservoir's
/// alpha) are compared for exact equality, since callers are expected to supply
/// identical literals when they intend to reuse a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReservoirDescriptor {
    /// A [`UniformReservoir`] with the given capacity.
    Uniform {
        /// The reservoir's capacity.
        capacity: usize,
    },
    /// A [`SlidingWindowReservoir`] with the given window size.
    SlidingWindow {
        /// The number of most-recent samples retained.
        window_size: usize,
    },
    /// A [`SlidingTimeWindowReservoir`] with the given window duration.
    SlidingTimeWindow {
        /// The duration of the retained window.
        window: Duration,
    },
    /// An [`ExponentiallyDecayingReservoir`] with the given capacity and decay factor.
    ExponentiallyDecaying {
        /// The reservoir's capacity.
        capacity: usize,
        /// The exponential decay factor.
        alpha: f64,
    },
}

impl ReservoirDescriptor {
    /// A human-readable name for the reservoir kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReservoirDescriptor::Uniform { .. } => "uniform",
            ReservoirDescriptor::SlidingWindow { .. } => "sliding_window",
            ReservoirDescriptor::SlidingTimeWindow { .. } => "sliding_time_window",
            ReservoirDescriptor::ExponentiallyDecaying { .. } => "exp_decaying",
        }
    }
}
