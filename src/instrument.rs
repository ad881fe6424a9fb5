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

//! The closed set of metric types a registry can hold, and the generic
//! `notify`/`snapshot` operations that work uniformly across all of them.

use crate::snapshot::Snapshot as HistogramSnapshot;
use crate::{AppMetricsError, Counter, Gauge, Histogram, Meter, Timer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_value::Value;
use std::sync::Arc;

/// A metric of one of the kinds a [`MetricRegistry`](crate::MetricRegistry) can hold.
#[derive(Clone)]
pub enum Instrument {
    /// A monotonic (or bidirectionally adjustable) integer counter.
    Counter(Arc<Counter>),
    /// A last-value-wins gauge of arbitrary serializable type.
    Gauge(Arc<Gauge>),
    /// A statistical distribution of values, backed by a bounded reservoir.
    Histogram(Arc<Histogram>),
    /// A rate-of-occurrence meter with 1/5/15-minute rolling averages.
    Meter(Arc<Meter>),
    /// The duration of the most recently completed timed operation.
    Timer(Arc<Timer>),
}

impl Instrument {
    /// The instrument's kind tag, as reported in its snapshot's `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Instrument::Counter(_) => "counter",
            Instrument::Gauge(_) => "gauge",
            Instrument::Histogram(_) => "histogram",
            Instrument::Meter(_) => "meter",
            Instrument::Timer(_) => "timer",
        }
    }

    /// Applies a generic value notification to the instrument, dispatching to
    /// the appropriate typed method for its concrete kind.
    ///
    /// This is the operation the HTTP facade's `POST` route, and the registry's
    /// own [`notify`](crate::MetricRegistry::notify), use to update a metric
    /// without knowing its concrete type ahead of time. Instruments accessed
    /// directly through their typed handles (e.g. `Arc<Counter>`) should prefer
    /// their own typed methods instead.
    pub fn notify(&self, value: Value) -> Result<(), AppMetricsError> {
        match self {
            Instrument::Counter(c) => {
                c.add(value_to_i64(&value)?);
                Ok(())
            }
            Instrument::Gauge(g) => {
                g.notify(value);
                Ok(())
            }
            Instrument::Histogram(h) => {
                h.update(value_to_f64(&value)?);
                Ok(())
            }
            Instrument::Meter(m) => {
                m.mark(value_to_i64(&value)?);
                Ok(())
            }
            Instrument::Timer(t) => {
                t.update(value_to_f64(&value)?);
                Ok(())
            }
        }
    }

    /// Computes a read-only snapshot of the instrument's current state.
    pub fn snapshot(&self) -> InstrumentSnapshot {
        match self {
            Instrument::Counter(c) => InstrumentSnapshot::Counter { value: c.count() },
            Instrument::Gauge(g) => InstrumentSnapshot::Gauge { value: g.value() },
            Instrument::Histogram(h) => {
                InstrumentSnapshot::Histogram(h.snapshot())
            }
            Instrument::Meter(m) => InstrumentSnapshot::Meter {
                count: m.count(),
                mean_rate: m.mean_rate(),
                m1: m.one_minute_rate(),
                m5: m.five_minute_rate(),
                m15: m.fifteen_minute_rate(),
                tick_interval: m.tick_interval().as_secs_f64(),
            },
            Instrument::Timer(t) => InstrumentSnapshot::Timer { value: t.value() },
        }
    }
}

fn value_to_i64(value: &Value) -> Result<i64, AppMetricsError> {
    match value {
        Value::I8(v) => Ok(*v as i64),
        Value::I16(v) => Ok(*v as i64),
        Value::I32(v) => Ok(*v as i64),
        Value::I64(v) => Ok(*v),
        Value::U8(v) => Ok(*v as i64),
        Value::U16(v) => Ok(*v as i64),
        Value::U32(v) => Ok(*v as i64),
        Value::U64(v) => Ok(*v as i64),
        Value::F32(v) => Ok(*v as i64),
        Value::F64(v) => Ok(*v as i64),
        other => Err(AppMetricsError::InvalidArgument(format!(
            "expected an integer value, got {:?}",
            other
        ))),
    }
}

fn value_to_f64(value: &Value) -> Result<f64, AppMetricsError> {
    match value {
        Value::I8(v) => Ok(*v as f64),
        Value::I16(v) => Ok(*v as f64),
        Value::I32(v) => Ok(*v as f64),
        Value::I64(v) => Ok(*v as f64),
        Value::U8(v) => Ok(*v as f64),
        Value::U16(v) => Ok(*v as f64),
        Value::U32(v) => Ok(*v as f64),
        Value::U64(v) => Ok(*v as f64),
        Value::F32(v) => Ok(*v as f64),
        Value::F64(v) => Ok(*v),
        other => Err(AppMetricsError::InvalidArgument(format!(
            "expected a numeric value, got {:?}",
            other
        ))),
    }
}

/// A self-consistent, serializable view of an instrument's current state.
///
/// The `Serialize` implementation flattens each variant into the literal
/// `{"kind": ..., ...}` shape used by the HTTP exposition facade; the `kind`
/// field always names the instrument type, never its reservoir (a histogram
/// backed by a sliding-window reservoir still reports `"kind": "histogram"`).
pub enum InstrumentSnapshot {
    /// A counter's current value.
    Counter {
        /// The counter's current value.
        value: i64,
    },
    /// A gauge's most recently notified value.
    Gauge {
        /// `None` if the gauge has never been notified.
        value: Option<Value>,
    },
    /// A histogram's distribution of currently-retained values.
    Histogram(HistogramSnapshot),
    /// A meter's count and rolling average rates.
    Meter {
        /// The total number of marked events.
        count: i64,
        /// The mean rate, in events per second, since the meter was created.
        mean_rate: f64,
        /// The one-minute rolling average rate, in events per second.
        m1: f64,
        /// The five-minute rolling average rate, in events per second.
        m5: f64,
        /// The fifteen-minute rolling average rate, in events per second.
        m15: f64,
        /// The interval, in seconds, between rate ticks.
        tick_interval: f64,
    },
    /// A timer's most recently recorded duration.
    Timer {
        /// The duration, in seconds, of the last completed operation, or `0`
        /// if none has completed yet.
        value: f64,
    },
}

impl Serialize for InstrumentSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            InstrumentSnapshot::Counter { value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "counter")?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            InstrumentSnapshot::Gauge { value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "gauge")?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            InstrumentSnapshot::Histogram(snapshot) => {
                match &snapshot.stats {
                    None => {
                        let mut map = serializer.serialize_map(Some(2))?;
                        map.serialize_entry("kind", "histogram")?;
                        map.serialize_entry("size", &snapshot.size)?;
                        map.end()
                    }
                    Some(stats) => {
                        let mut map = serializer.serialize_map(Some(9))?;
                        map.serialize_entry("kind", "histogram")?;
                        map.serialize_entry("size", &snapshot.size)?;
                        map.serialize_entry("min", &stats.min)?;
                        map.serialize_entry("max", &stats.max)?;
                        map.serialize_entry("arithmetic_mean", &stats.mean)?;
                        map.serialize_entry("standard_deviation", &stats.stddev)?;
                        map.serialize_entry("median", &stats.median)?;
                        let percentiles = stats
                            .percentiles
                            .iter()
                            .map(|&(label, v)| (label, v))
                            .collect::<std::collections::BTreeMap<_, _>>();
                        map.serialize_entry("percentile", &percentiles)?;
                        map.serialize_entry("histogram", &stats.buckets)?;
                        map.end()
                    }
                }
            }
            InstrumentSnapshot::Meter {
                count,
                mean_rate,
                m1,
                m5,
                m15,
                tick_interval,
            } => {
                let mut map = serializer.serialize_map(Some(8))?;
                map.serialize_entry("kind", "meter")?;
                map.serialize_entry("count", count)?;
                map.serialize_entry("mean_rate", mean_rate)?;
                map.serialize_entry("m1", m1)?;
                map.serialize_entry("m5", m5)?;
                map.serialize_entry("m15", m15)?;
                map.serialize_entry("unit", "per-second")?;
                map.serialize_entry("tick_interval", tick_interval)?;
                map.end()
            }
            InstrumentSnapshot::Timer { value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "timer")?;
                map.serialize_entry("value", value)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notify_coerces_numeric_values_per_kind() {
        let counter = Instrument::Counter(Arc::new(Counter::new()));
        counter.notify(Value::I32(5)).unwrap();
        match &counter {
            Instrument::Counter(c) => assert_eq!(c.count(), 5),
            _ => unreachable!(),
        }

        let histogram = Instrument::Histogram(Arc::new(Histogram::default()));
        histogram.notify(Value::U32(10)).unwrap();
        match &histogram {
            Instrument::Histogram(h) => assert_eq!(h.count(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn notify_rejects_non_numeric_values_for_counters() {
        let counter = Instrument::Counter(Arc::new(Counter::new()));
        let result = counter.notify(Value::String("nope".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn gauge_notify_accepts_any_value() {
        let gauge = Instrument::Gauge(Arc::new(Gauge::new()));
        gauge
            .notify(Value::String("hello".to_string()))
            .unwrap();
        match &gauge {
            Instrument::Gauge(g) => {
                assert_eq!(g.value(), Some(Value::String("hello".to_string())))
            }
            _ => unreachable!(),
        }
    }
}
