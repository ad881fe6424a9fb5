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

//! A metric which reports the last value it was told about.

use parking_lot::Mutex;
use serde::Serialize;
use serde_value::Value;

/// A metric holding the most recently reported value, of arbitrary serializable
/// type.
///
/// Unlike a [`Counter`](crate::Counter), a gauge's value isn't accumulated; each
/// call to [`notify`](Gauge::notify) replaces whatever was there before. A gauge
/// that has never been notified holds no value.
pub struct Gauge {
    value: Mutex<Option<Value>>,
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl Gauge {
    /// Creates a new gauge with no value.
    pub fn new() -> Self {
        Gauge {
            value: Mutex::new(None),
        }
    }

    /// Records a new value, discarding whatever was previously recorded.
    ///
    /// The value is serialized and stored verbatim; it is not interpreted or
    /// validated in any way.
    pub fn notify<T>(&self, value: T)
    where
        T: Serialize,
    {
        let value = serde_value::to_value(value).expect("value failed to serialize");
        *self.value.lock() = Some(value);
    }

    /// Returns the most recently recorded value, or `None` if the gauge has never
    /// been notified.
    pub fn value(&self) -> Option<Value> {
        self.value.lock().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_with_no_value() {
        let gauge = Gauge::new();
        assert_eq!(gauge.value(), None);
    }

    #[test]
    fn notify_replaces_the_previous_value() {
        let gauge = Gauge::new();
        gauge.notify(1);
        assert_eq!(gauge.value(), Some(Value::I32(1)));

        gauge.notify("a string");
        assert_eq!(gauge.value(), Some(Value::String("a string".to_string())));
    }
}
