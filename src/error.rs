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
use std::error;
use std::fmt;

/// An error produced by the measurement engine.
#[derive(Debug)]
pub enum AppMetricsError {
    /// A name is already bound, or bound to an incompatible instrument kind or
    /// configuration.
    DuplicateMetric(String),
    /// A name is not bound to any instrument.
    InvalidMetric(String),
    /// A value could not be coerced for the target instrument, or an unknown
    /// metric or reservoir type was requested.
    InvalidArgument(String),
}

impl fmt::Display for AppMetricsError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMetricsError::DuplicateMetric(msg) => write!(fmt, "duplicate metric: {}", msg),
            AppMetricsError::InvalidMetric(msg) => write!(fmt, "invalid metric: {}", msg),
            AppMetricsError::InvalidArgument(msg) => write!(fmt, "invalid argument: {}", msg),
        }
    }
}

impl error::Error for AppMetricsError {}
