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

//! The process-wide (or locally owned) collection of named instruments.

use crate::instrument::{Instrument, InstrumentSnapshot};
use crate::{AppMetricsError, Counter, Gauge, Histogram, Meter, Timer};
use parking_lot::Mutex;
use serde_value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A collection of named metrics, plus a tag index over them.
///
/// A name may be registered at most once; re-registering the same name is an
/// error regardless of whether the new instrument is the same kind as the old
/// one (see [`register`](MetricRegistry::register)). Use
/// [`counter`](MetricRegistry::counter) and its siblings for the common
/// get-or-create pattern instead.
#[derive(Default)]
pub struct MetricRegistry {
    metrics: Mutex<HashMap<String, Instrument>>,
    tags: Mutex<HashMap<String, HashSet<String>>>,
}

impl MetricRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> MetricRegistry {
        MetricRegistry::default()
    }

    /// Registers `instrument` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppMetricsError::DuplicateMetric`] if `name` is already
    /// registered, regardless of the existing instrument's kind. The registry
    /// is left unchanged when this happens.
    pub fn register(&self, name: &str, instrument: Instrument) -> Result<(), AppMetricsError> {
        let mut metrics = self.metrics.lock();
        if metrics.contains_key(name) {
            return Err(AppMetricsError::DuplicateMetric(name.to_string()));
        }
        if let Instrument::Meter(m) = &instrument {
            m.spawn_ticker();
        }
        metrics.insert(name.to_string(), instrument);
        Ok(())
    }

    /// Looks up the instrument registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Instrument> {
        self.metrics.lock().get(name).cloned()
    }

    /// Removes the instrument registered under `name`, along with any tags
    /// pointing to it, returning it if it was present.
    ///
    /// If the removed instrument is a [`Meter`], its background ticker thread
    /// is joined before this call returns — deletion never leaves a ticker
    /// thread running past the instrument's removal from the registry, even
    /// if the caller also holds an `Arc<Meter>` of their own that keeps the
    /// meter itself alive.
    pub fn delete(&self, name: &str) -> Option<Instrument> {
        let removed = self.metrics.lock().remove(name);
        if let Some(instrument) = &removed {
            let mut tags = self.tags.lock();
            tags.retain(|_, names| {
                names.remove(name);
                !names.is_empty()
            });
            if let Instrument::Meter(m) = instrument {
                m.stop_ticker();
            }
        }
        removed
    }

    /// Stops every currently registered meter's background ticker thread,
    /// without removing any instrument from the registry.
    ///
    /// Intended for process/registry teardown, where callers want tickers
    /// joined deterministically but don't need the registry's contents
    /// cleared out first.
    pub fn shutdown(&self) {
        for instrument in self.metrics.lock().values() {
            if let Instrument::Meter(m) = instrument {
                m.stop_ticker();
            }
        }
    }

    /// Returns the names of every registered instrument, sorted ascending.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.metrics.lock().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Returns a snapshot of the instrument registered under `name`.
    pub fn get(&self, name: &str) -> Option<InstrumentSnapshot> {
        self.lookup(name).map(|i| i.snapshot())
    }

    /// Applies a generic value notification to the instrument registered under
    /// `name`, dispatching to the appropriate typed operation for its kind.
    ///
    /// # Errors
    ///
    /// Returns [`AppMetricsError::InvalidMetric`] if no instrument is registered
    /// under `name`, or whatever [`Instrument::notify`] returns if the value is
    /// incompatible with the instrument's kind.
    pub fn notify(&self, name: &str, value: Value) -> Result<(), AppMetricsError> {
        match self.lookup(name) {
            Some(instrument) => instrument.notify(value),
            None => Err(AppMetricsError::InvalidMetric(name.to_string())),
        }
    }

    /// Associates `name` with `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`AppMetricsError::InvalidMetric`] if `name` is not currently
    /// registered. Idempotent: tagging an already-tagged name with the same
    /// tag a second time succeeds without creating a duplicate entry.
    pub fn tag(&self, name: &str, tag: &str) -> Result<(), AppMetricsError> {
        if !self.metrics.lock().contains_key(name) {
            return Err(AppMetricsError::InvalidMetric(name.to_string()));
        }
        self.tags
            .lock()
            .entry(tag.to_string())
            .or_default()
            .insert(name.to_string());
        Ok(())
    }

    /// Returns every tag currently in use, and the names associated with each.
    pub fn tags_snapshot(&self) -> HashMap<String, HashSet<String>> {
        self.tags.lock().clone()
    }

    /// Returns snapshots of every currently registered instrument tagged with
    /// `tag`.
    ///
    /// A name recorded under a tag whose instrument has since been deleted is
    /// silently skipped rather than treated as an error — tags are a loose
    /// index, not a referential-integrity constraint.
    pub fn by_tag(&self, tag: &str) -> HashMap<String, InstrumentSnapshot> {
        let names = match self.tags.lock().get(tag) {
            Some(names) => names.clone(),
            None => return HashMap::new(),
        };

        names
            .into_iter()
            .filter_map(|name| {
                let snapshot = self.get(&name)?;
                Some((name, snapshot))
            })
            .collect()
    }

    /// Returns the counter registered under `name`, registering a new one if
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-counter.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.counter_with(name, Counter::new)
    }

    /// Returns the counter registered under `name`, using `make_counter` to
    /// create it if absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-counter.
    pub fn counter_with<F>(&self, name: &str, make_counter: F) -> Arc<Counter>
    where
        F: FnOnce() -> Counter,
    {
        match self.lookup(name) {
            Some(Instrument::Counter(c)) => c,
            Some(_) => panic!("metric {:?} already registered as a non-counter", name),
            None => {
                let counter = Arc::new(make_counter());
                // benign race: if another thread wins, fall back to its instance.
                match self.register(name, Instrument::Counter(counter.clone())) {
                    Ok(()) => counter,
                    Err(_) => match self.lookup(name) {
                        Some(Instrument::Counter(c)) => c,
                        _ => panic!("metric {:?} already registered as a non-counter", name),
                    },
                }
            }
        }
    }

    /// Returns the gauge registered under `name`, registering a new one if
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-gauge.
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        match self.lookup(name) {
            Some(Instrument::Gauge(g)) => g,
            Some(_) => panic!("metric {:?} already registered as a non-gauge", name),
            None => {
                let gauge = Arc::new(Gauge::new());
                match self.register(name, Instrument::Gauge(gauge.clone())) {
                    Ok(()) => gauge,
                    Err(_) => match self.lookup(name) {
                        Some(Instrument::Gauge(g)) => g,
                        _ => panic!("metric {:?} already registered as a non-gauge", name),
                    },
                }
            }
        }
    }

    /// Returns the histogram registered under `name`, using `make_histogram` to
    /// create it if absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-histogram.
    pub fn histogram_with<F>(&self, name: &str, make_histogram: F) -> Arc<Histogram>
    where
        F: FnOnce() -> Histogram,
    {
        match self.lookup(name) {
            Some(Instrument::Histogram(h)) => h,
            Some(_) => panic!("metric {:?} already registered as a non-histogram", name),
            None => {
                let histogram = Arc::new(make_histogram());
                match self.register(name, Instrument::Histogram(histogram.clone())) {
                    Ok(()) => histogram,
                    Err(_) => match self.lookup(name) {
                        Some(Instrument::Histogram(h)) => h,
                        _ => panic!("metric {:?} already registered as a non-histogram", name),
                    },
                }
            }
        }
    }

    /// Returns the histogram registered under `name`, registering a new one with
    /// the default reservoir if absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-histogram.
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        self.histogram_with(name, Histogram::default)
    }

    /// Returns the meter registered under `name`, registering a new one if
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-meter.
    pub fn meter(&self, name: &str) -> Arc<Meter> {
        self.meter_with(name, Meter::new)
    }

    /// Returns the meter registered under `name`, using `make_meter` to create
    /// it if absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-meter.
    pub fn meter_with<F>(&self, name: &str, make_meter: F) -> Arc<Meter>
    where
        F: FnOnce() -> Meter,
    {
        match self.lookup(name) {
            Some(Instrument::Meter(m)) => m,
            Some(_) => panic!("metric {:?} already registered as a non-meter", name),
            None => {
                let meter = Arc::new(make_meter());
                match self.register(name, Instrument::Meter(meter.clone())) {
                    Ok(()) => meter,
                    Err(_) => match self.lookup(name) {
                        Some(Instrument::Meter(m)) => m,
                        _ => panic!("metric {:?} already registered as a non-meter", name),
                    },
                }
            }
        }
    }

    /// Returns the timer registered under `name`, registering a new one if
    /// absent.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered as a non-timer.
    pub fn timer(&self, name: &str) -> Arc<Timer> {
        match self.lookup(name) {
            Some(Instrument::Timer(t)) => t,
            Some(_) => panic!("metric {:?} already registered as a non-timer", name),
            None => {
                let timer = Arc::new(Timer::new());
                match self.register(name, Instrument::Timer(timer.clone())) {
                    Ok(()) => timer,
                    Err(_) => match self.lookup(name) {
                        Some(Instrument::Timer(t)) => t,
                        _ => panic!("metric {:?} already registered as a non-timer", name),
                    },
                }
            }
        }
    }

    /// Returns a snapshot of every registered instrument, keyed by name.
    pub fn metrics(&self) -> HashMap<String, InstrumentSnapshot> {
        self.metrics
            .lock()
            .iter()
            .map(|(name, instrument)| (name.clone(), instrument.snapshot()))
            .collect()
    }
}

/// The process-wide default registry.
///
/// Most applications register all of their metrics against this single
/// instance, rather than threading a `MetricRegistry` through their call
/// graph.
pub static DEFAULT_REGISTRY: once_cell::sync::Lazy<MetricRegistry> =
    once_cell::sync::Lazy::new(MetricRegistry::new);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn re_registering_a_name_is_an_error() {
        let registry = MetricRegistry::new();
        registry.counter("requests");

        let err = registry
            .register("requests", Instrument::Counter(Arc::new(Counter::new())))
            .unwrap_err();
        assert!(matches!(err, AppMetricsError::DuplicateMetric(_)));
    }

    #[test]
    fn counter_get_or_create_returns_the_same_instance() {
        let registry = MetricRegistry::new();

        let a = registry.counter("requests");
        let b = registry.counter("requests");
        a.add(1);
        assert_eq!(b.count(), 1);
    }

    #[test]
    #[should_panic(expected = "already registered as a non-counter")]
    fn kind_mismatch_on_get_or_create_panics() {
        let registry = MetricRegistry::new();
        registry.gauge("thing");
        registry.counter("thing");
    }

    #[test]
    fn delete_removes_the_instrument_and_its_tags() {
        let registry = MetricRegistry::new();
        registry.counter("requests");
        registry.tag("requests", "http").unwrap();

        assert!(registry.delete("requests").is_some());
        assert!(registry.lookup("requests").is_none());
        assert!(registry.by_tag("http").is_empty());
    }

    #[test]
    fn by_tag_silently_skips_vanished_names() {
        let registry = MetricRegistry::new();
        registry.counter("requests");
        registry.tag("requests", "http").unwrap();
        registry.delete("requests");

        assert!(registry.by_tag("http").is_empty());
    }

    #[test]
    fn by_tag_reflects_deletions_of_other_tagged_names() {
        let registry = MetricRegistry::new();
        registry.counter("c");
        registry.meter("m");
        registry.tag("c", "core").unwrap();
        registry.tag("m", "core").unwrap();

        registry.delete("c");

        let tagged = registry.by_tag("core");
        assert_eq!(tagged.len(), 1);
        assert!(tagged.contains_key("m"));
    }

    #[test]
    fn tagging_an_unregistered_name_is_an_error() {
        let registry = MetricRegistry::new();
        let err = registry.tag("nope", "http").unwrap_err();
        assert!(matches!(err, AppMetricsError::InvalidMetric(_)));
        assert!(registry.by_tag("http").is_empty());
    }

    #[test]
    fn notify_dispatches_to_the_registered_instruments_kind() {
        let registry = MetricRegistry::new();
        let counter = registry.counter("requests");

        registry.notify("requests", Value::I32(3)).unwrap();
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn notify_on_an_unregistered_name_is_an_error() {
        let registry = MetricRegistry::new();
        let err = registry.notify("nope", Value::I32(1)).unwrap_err();
        assert!(matches!(err, AppMetricsError::InvalidMetric(_)));
    }

    #[test]
    fn deleting_a_meter_stops_its_ticker_before_returning() {
        let registry = MetricRegistry::new();
        let meter = registry.meter("requests");
        meter.mark(1);

        registry.delete("requests");

        // the ticker thread was joined by `delete`; the meter itself survives
        // via our own `Arc`, but it no longer has a ticker running.
        assert_eq!(meter.count(), 1);
    }

    #[test]
    fn shutdown_stops_every_meters_ticker_without_removing_them() {
        let registry = MetricRegistry::new();
        registry.meter("a");
        registry.meter("b");

        registry.shutdown();

        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn names_lists_every_registered_instrument_sorted() {
        let registry = MetricRegistry::new();
        registry.counter("b");
        registry.gauge("a");

        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
