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

//! Higher-order wrappers which time or count a unit of work against a named
//! metric, get-or-creating it on first use.

use crate::{AppMetricsError, Histogram, Meter, MetricRegistry, Reservoir};
use std::time::{Duration, Instant};

/// Runs `f`, recording its wall-clock duration in seconds to the histogram
/// registered under `name`.
///
/// If `name` isn't registered yet, a histogram backed by `reservoir` is
/// registered for it. If it's already registered, `f` is still measured and
/// recorded as long as the existing histogram's reservoir is the same kind and
/// configuration as `reservoir` — otherwise this returns
/// [`AppMetricsError::DuplicateMetric`] without calling `f`.
pub fn timed<F, R, Res>(
    registry: &MetricRegistry,
    name: &str,
    reservoir: Res,
    f: F,
) -> Result<R, AppMetricsError>
where
    F: FnOnce() -> R,
    Res: Reservoir,
{
    let descriptor = reservoir.descriptor();
    let histogram = registry.histogram_with(name, || Histogram::new(reservoir));
    if histogram.reservoir_descriptor() != descriptor {
        return Err(AppMetricsError::DuplicateMetric(format!(
            "metric {:?} already registered with a different reservoir",
            name
        )));
    }

    let start = Instant::now();
    let result = f();
    histogram.update(start.elapsed().as_secs_f64());
    Ok(result)
}

/// Runs `f`, marking one occurrence on the meter registered under `name` once
/// `f` returns.
///
/// If `name` isn't registered yet, a meter ticking every `tick_interval` is
/// registered for it. If it's already registered, the call is still marked as
/// long as the existing meter's tick interval matches `tick_interval` —
/// otherwise this returns [`AppMetricsError::DuplicateMetric`] without calling
/// `f`.
///
/// If `f` panics, no mark is recorded — the meter counts completed calls, not
/// attempted ones.
pub fn counted<F, R>(
    registry: &MetricRegistry,
    name: &str,
    tick_interval: Duration,
    f: F,
) -> Result<R, AppMetricsError>
where
    F: FnOnce() -> R,
{
    let meter = registry.meter_with(name, || Meter::with_tick_interval(tick_interval));
    if meter.tick_interval() != tick_interval {
        return Err(AppMetricsError::DuplicateMetric(format!(
            "metric {:?} already registered with a different tick interval",
            name
        )));
    }

    let result = f();
    meter.mark(1);
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reservoir::uniform::UniformReservoir;

    #[test]
    fn timed_registers_and_records_a_histogram() {
        let registry = MetricRegistry::new();

        let result = timed(&registry, "work", UniformReservoir::with_capacity(10), || {
            1 + 1
        })
        .unwrap();

        assert_eq!(result, 2);
        let histogram = registry.histogram("work");
        assert_eq!(histogram.count(), 1);
    }

    #[test]
    fn timed_errors_on_reservoir_mismatch_without_running_f() {
        let registry = MetricRegistry::new();
        timed(&registry, "work", UniformReservoir::with_capacity(10), || ()).unwrap();

        let mut ran = false;
        let result = timed(&registry, "work", UniformReservoir::with_capacity(20), || {
            ran = true;
        });

        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn counted_marks_one_event_per_completed_call() {
        let registry = MetricRegistry::new();

        for _ in 0..3 {
            counted(&registry, "calls", Duration::from_secs(5), || ()).unwrap();
        }

        assert_eq!(registry.meter("calls").count(), 3);
    }

    #[test]
    fn counted_errors_on_tick_interval_mismatch() {
        let registry = MetricRegistry::new();
        counted(&registry, "calls", Duration::from_secs(5), || ()).unwrap();

        let result = counted(&registry, "calls", Duration::from_secs(10), || ());
        assert!(result.is_err());
    }
}
