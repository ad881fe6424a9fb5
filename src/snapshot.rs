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

//! Descriptive statistics over a finite set of sampled values.

use serde::Serialize;

/// The percentiles reported in every histogram snapshot, as fractions of 1.
const PERCENTILES: &[(&str, f64)] = &[
    ("50", 0.5),
    ("75", 0.75),
    ("90", 0.9),
    ("95", 0.95),
    ("99", 0.99),
    ("99.9", 0.999),
];

/// The number of equal-width buckets in a snapshot's display histogram.
const DISPLAY_BUCKETS: usize = 5;

/// One bucket of the equal-width display histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bucket {
    /// The inclusive lower bound of the bucket.
    pub from: f64,
    /// The exclusive upper bound of the bucket (inclusive for the last bucket).
    pub to: f64,
    /// The number of values falling in the bucket.
    pub count: usize,
}

/// Statistics computed over a non-empty value set.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// The minimum value.
    pub min: f64,
    /// The maximum value.
    pub max: f64,
    /// The arithmetic mean.
    pub mean: f64,
    /// The sample standard deviation (0 for a single value).
    pub stddev: f64,
    /// The median (50th percentile).
    pub median: f64,
    /// The `{50, 75, 90, 95, 99, 99.9}` percentiles, labeled by percentile.
    pub percentiles: Vec<(&'static str, f64)>,
    /// A display-only equal-width 5-bucket histogram over `[min, max]`.
    pub buckets: Vec<Bucket>,
}

/// A read-only, self-consistent view of the values recorded by an instrument,
/// suitable for serialization.
///
/// Computed by copying an instrument's current value set out from under its lock
/// and running the statistics in this module over the copy, per the "snapshot copy-out"
/// rule of the concurrency model: no instrument lock is held while this runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The number of values the snapshot was computed over.
    pub size: usize,
    /// `None` when `size == 0` — an empty reservoir has no derived statistics.
    pub stats: Option<Stats>,
}

impl Snapshot {
    /// Computes a snapshot over a (possibly empty) copy of a reservoir's current values.
    pub fn of(values: &[f64]) -> Snapshot {
        let n = values.len();
        if n == 0 {
            return Snapshot {
                size: 0,
                stats: None,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let min = sorted[0];
        let max = sorted[n - 1];
        let mean = sorted.iter().sum::<f64>() / n as f64;

        let stddev = if n < 2 {
            0.
        } else {
            let variance =
                sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.);
            variance.sqrt()
        };

        let percentiles = PERCENTILES
            .iter()
            .map(|&(label, p)| (label, percentile(&sorted, p)))
            .collect::<Vec<_>>();
        let median = percentile(&sorted, 0.5);

        Snapshot {
            size: n,
            stats: Some(Stats {
                min,
                max,
                mean,
                stddev,
                median,
                percentiles,
                buckets: buckets(&sorted, min, max),
            }),
        }
    }
}

/// Linear-interpolated percentile of a pre-sorted, non-empty slice.
///
/// `p` is a fraction in `[0, 1]`; `p = 0.5` is the median.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let pos = p * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

fn buckets(sorted: &[f64], min: f64, max: f64) -> Vec<Bucket> {
    let width = (max - min) / DISPLAY_BUCKETS as f64;
    if width == 0. {
        return vec![Bucket {
            from: min,
            to: max,
            count: sorted.len(),
        }];
    }

    let mut buckets = (0..DISPLAY_BUCKETS)
        .map(|i| Bucket {
            from: min + width * i as f64,
            to: min + width * (i + 1) as f64,
            count: 0,
        })
        .collect::<Vec<_>>();

    for &value in sorted {
        let idx = (((value - min) / width) as usize).min(DISPLAY_BUCKETS - 1);
        buckets[idx].count += 1;
    }

    buckets
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn empty_has_no_stats() {
        let snapshot = Snapshot::of(&[]);
        assert_eq!(snapshot.size, 0);
        assert!(snapshot.stats.is_none());
    }

    #[test]
    fn four_value_distribution() {
        let snapshot = Snapshot::of(&[1.0, 2.0, 3.0, 4.0]);
        let stats = snapshot.stats.unwrap();

        assert_eq!(snapshot.size, 4);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_approx_eq!(stats.stddev, 1.2909944, 1e-6);
    }

    #[test]
    fn single_value_has_zero_stddev() {
        let snapshot = Snapshot::of(&[42.0]);
        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.stddev, 0.);
        assert_eq!(stats.median, 42.0);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let values = (0..1000).map(|i| i as f64).collect::<Vec<_>>();
        let snapshot = Snapshot::of(&values);
        let stats = snapshot.stats.unwrap();

        let p = |label: &str| {
            stats
                .percentiles
                .iter()
                .find(|&&(l, _)| l == label)
                .unwrap()
                .1
        };

        assert!(stats.min <= p("50"));
        assert!(p("50") <= p("75"));
        assert!(p("75") <= p("90"));
        assert!(p("90") <= p("95"));
        assert!(p("95") <= p("99"));
        assert!(p("99") <= p("99.9"));
        assert!(p("99.9") <= stats.max);
    }

    #[test]
    fn degenerate_constant_distribution_has_one_bucket() {
        let snapshot = Snapshot::of(&[5.0, 5.0, 5.0]);
        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.buckets.len(), 1);
        assert_eq!(stats.buckets[0].count, 3);
    }
}
