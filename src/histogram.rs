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

//! A metric tracking a statistical distribution of values.

use crate::reservoir::{ExponentiallyDecayingReservoir, Reservoir, ReservoirDescriptor};
use crate::snapshot::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// A metric tracking a statistical distribution of values, backed by a bounded
/// [`Reservoir`].
///
/// The histogram's default reservoir implementation (used by its [`Default`]
/// implementation) is the [`ExponentiallyDecayingReservoir`].
pub struct Histogram {
    count: AtomicU64,
    reservoir: Box<dyn Reservoir>,
}

impl Default for Histogram {
    fn default() -> Histogram {
        Histogram::new(ExponentiallyDecayingReservoir::new())
    }
}

impl Histogram {
    /// Creates a new histogram using the provided reservoir.
    pub fn new<R>(reservoir: R) -> Histogram
    where
        R: Reservoir,
    {
        Histogram {
            count: AtomicU64::new(0),
            reservoir: Box::new(reservoir),
        }
    }

    /// Adds a value to the histogram.
    ///
    /// The running `count` reflects every value ever added, even once the
    /// reservoir itself has started discarding old or unlucky samples.
    pub fn update(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.reservoir.update(value);
    }

    /// Returns the total number of values added to the histogram.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the statistical distribution of values currently
    /// retained by the reservoir.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of(&self.reservoir.current_values())
    }

    /// Returns a descriptor identifying the histogram's reservoir kind and
    /// parameters, used by the registry to detect incompatible re-registration.
    pub fn reservoir_descriptor(&self) -> ReservoirDescriptor {
        self.reservoir.descriptor()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reservoir::uniform::UniformReservoir;

    #[test]
    fn count_tracks_every_update_even_past_capacity() {
        let histogram = Histogram::new(UniformReservoir::with_capacity(10));
        for i in 0..100 {
            histogram.update(i as f64);
        }

        assert_eq!(histogram.count(), 100);
        assert_eq!(histogram.snapshot().size, 10);
    }

    #[test]
    fn empty_histogram_has_no_stats() {
        let histogram = Histogram::new(UniformReservoir::with_capacity(10));
        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.size, 0);
        assert!(snapshot.stats.is_none());
    }

    #[test]
    fn snapshot_reflects_updates() {
        let histogram = Histogram::new(UniformReservoir::with_capacity(100));
        histogram.update(15.0);
        histogram.update(10.0);

        let snapshot = histogram.snapshot();
        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 15.0);
    }
}
