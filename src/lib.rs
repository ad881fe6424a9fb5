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
//! An in-process application metrics library.
//!
//! The design of the crate is based fairly closely off of the [Dropwizard Metrics] library from the Java ecosystem,
//! by way of a small Python library of the same lineage: a concurrent registry of named counters, gauges, timers,
//! histograms and meters, backed by a choice of sample-retention reservoirs.
//!
//! # Examples
//!
//! ```
//! use app_metrics::MetricRegistry;
//!
//! // A `MetricRegistry` stores metrics, keyed by name.
//! let registry = MetricRegistry::new();
//!
//! let yaks_shaved = registry.counter("yaks.shaved");
//! let request_timer = registry.timer("server.requests");
//!
//! // do some work and record some values.
//! yaks_shaved.inc();
//! let _ = request_timer.time();
//!
//! // Grab a snapshot of every metric currently registered.
//! for (name, snapshot) in registry.metrics() {
//!     println!("{} is a {}", name, snapshot.kind());
//! }
//! ```
//!
//! [Dropwizard Metrics]: https://github.com/dropwizard/metrics
#![warn(missing_docs)]

pub use crate::clock::*;
pub use crate::counter::*;
pub use crate::decorators::*;
pub use crate::error::*;
pub use crate::gauge::*;
pub use crate::histogram::*;
pub use crate::instrument::*;
pub use crate::meter::*;
pub use crate::registry::*;
pub use crate::reservoir::{Reservoir, ReservoirDescriptor};
pub use crate::snapshot::*;
pub use crate::timer::*;

mod clock;
mod counter;
mod decorators;
mod error;
mod gauge;
mod histogram;
mod instrument;
mod meter;
mod registry;
pub mod reservoir;
mod snapshot;
mod timer;

#[cfg(feature = "http")]
pub mod http;

impl InstrumentSnapshot {
    /// The instrument's kind tag, mirroring [`Instrument::kind`].
    pub fn kind(&self) -> &'static str {
        match self {
            InstrumentSnapshot::Counter { .. } => "counter",
            InstrumentSnapshot::Gauge { .. } => "gauge",
            InstrumentSnapshot::Histogram(_) => "histogram",
            InstrumentSnapshot::Meter { .. } => "meter",
            InstrumentSnapshot::Timer { .. } => "timer",
        }
    }
}
