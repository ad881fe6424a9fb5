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

//! A metric tracking the rate of occurrence of an event.

use crate::Clock;
use parking_lot::{Condvar, Mutex};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// The default interval, in seconds, between ticks of a meter's rolling average
/// rates, matching Dropwizard Metrics.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;

const SECONDS_PER_MINUTE: f64 = 60.;

struct State {
    count: i64,
    rate_1m: Ewma,
    rate_5m: Ewma,
    rate_15m: Ewma,
}

/// Shared stop signal for a meter's background ticker thread.
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

struct Ticker {
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

/// A metric tracking the rate of occurrence of an event.
///
/// The meter tracks rolling average rates in the same manner as the Linux
/// kernel's load factor measurement, decaying its 1/5/15-minute exponentially
/// weighted moving averages once per `tick_interval`.
///
/// A freestanding meter only advances its rates lazily, when read or marked —
/// one that nobody reads or marks for an hour then gets a single mark will
/// catch its rates up to the current time in one jump, exactly as if the reads
/// had all happened on schedule. Call [`spawn_ticker`](Meter::spawn_ticker) on
/// an `Arc<Meter>` to additionally advance its rates on a dedicated background
/// thread, so a snapshot of an idle meter reflects true decay rather than
/// whatever the last reader happened to trigger; [`MetricRegistry`](crate::MetricRegistry)
/// does this automatically for every meter it registers, and stops the
/// ticker deterministically when the meter is deleted or the registry shuts
/// down.
pub struct Meter {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    uncounted: AtomicI64,
    last_tick: AtomicU64,
    start_time: Instant,
    state: Mutex<State>,
    ticker: Mutex<Option<Ticker>>,
}

impl Default for Meter {
    fn default() -> Meter {
        Meter::new()
    }
}

impl Meter {
    /// Creates a new meter with the [default tick interval](DEFAULT_TICK_INTERVAL_SECS)
    /// using the system clock.
    pub fn new() -> Meter {
        Meter::with_tick_interval(Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS))
    }

    /// Creates a new meter which ticks its rolling averages every `tick_interval`,
    /// using the system clock.
    pub fn with_tick_interval(tick_interval: Duration) -> Meter {
        Meter::new_with(crate::clock::SYSTEM_CLOCK.clone(), tick_interval)
    }

    /// Creates a new meter using the provided [`Clock`] as its time source and
    /// ticking every `tick_interval`.
    pub fn new_with(clock: Arc<dyn Clock>, tick_interval: Duration) -> Meter {
        let start_time = clock.now();
        Meter {
            clock,
            tick_interval,
            uncounted: AtomicI64::new(0),
            last_tick: AtomicU64::new(0),
            start_time,
            state: Mutex::new(State {
                count: 0,
                rate_1m: Ewma::new(1., tick_interval),
                rate_5m: Ewma::new(5., tick_interval),
                rate_15m: Ewma::new(15., tick_interval),
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Marks the occurrence of `n` event(s).
    pub fn mark(&self, n: i64) {
        self.mark_at(self.clock.now(), n);
    }

    fn mark_at(&self, time: Instant, n: i64) {
        self.tick_if_necessary(time);
        self.uncounted.fetch_add(n, Ordering::SeqCst);
    }

    /// Returns the number of events registered by the meter.
    pub fn count(&self) -> i64 {
        self.state.lock().count + self.uncounted.load(Ordering::SeqCst)
    }

    /// Returns the one minute rolling average rate of events per second.
    pub fn one_minute_rate(&self) -> f64 {
        self.tick_if_necessary(self.clock.now());
        self.state.lock().rate_1m.get()
    }

    /// Returns the five minute rolling average rate of events per second.
    pub fn five_minute_rate(&self) -> f64 {
        self.tick_if_necessary(self.clock.now());
        self.state.lock().rate_5m.get()
    }

    /// Returns the fifteen minute rolling average rate of events per second.
    pub fn fifteen_minute_rate(&self) -> f64 {
        self.tick_if_necessary(self.clock.now());
        self.state.lock().rate_15m.get()
    }

    /// Returns the mean rate of events per second since the meter was created.
    pub fn mean_rate(&self) -> f64 {
        let count = self.count() as f64;
        if count == 0. {
            0.
        } else {
            let time = (self.clock.now() - self.start_time).as_secs_f64();
            count / time
        }
    }

    /// Returns the configured interval between rate ticks.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    fn tick_if_necessary(&self, time: Instant) {
        let interval_secs = self.tick_interval.as_secs().max(1);
        let old_tick = self.last_tick.load(Ordering::SeqCst);
        let new_tick = (time - self.start_time).as_secs();
        let age = new_tick.saturating_sub(old_tick);

        if age < interval_secs {
            return;
        }

        let new_interval_start_tick = new_tick - age % interval_secs;
        if self
            .last_tick
            .compare_exchange(
                old_tick,
                new_interval_start_tick,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // another thread (or the background ticker) already ticked for us.
            return;
        }

        let required_ticks = age / interval_secs;
        let mut state = self.state.lock();

        let uncounted = self.uncounted.swap(0, Ordering::SeqCst);
        state.count += uncounted;

        state.rate_1m.tick(uncounted);
        state.rate_1m.decay(required_ticks - 1);

        state.rate_5m.tick(uncounted);
        state.rate_5m.decay(required_ticks - 1);

        state.rate_15m.tick(uncounted);
        state.rate_15m.decay(required_ticks - 1);
    }

    /// Starts a background thread which ticks this meter's rolling averages
    /// every `tick_interval`, even if nobody marks or reads it.
    ///
    /// Calling this more than once stops the previous ticker before starting a
    /// new one. The thread sleeps on a condition variable rather than a plain
    /// `sleep`, so [`stop_ticker`](Meter::stop_ticker) (and [`Drop`]) return
    /// promptly instead of waiting out the rest of the current interval.
    pub fn spawn_ticker(self: &Arc<Self>) {
        self.stop_ticker();

        let stop = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let meter = self.clone();
        let interval = self.tick_interval;
        let stop_for_thread = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut stopped = stop_for_thread.stopped.lock();
            loop {
                let timed_out = stop_for_thread
                    .condvar
                    .wait_for(&mut stopped, interval)
                    .timed_out();
                if *stopped {
                    break;
                }
                if timed_out {
                    parking_lot::MutexGuard::unlocked(&mut stopped, || {
                        meter.tick_if_necessary(meter.clock.now());
                    });
                }
            }
        });

        *self.ticker.lock() = Some(Ticker {
            stop,
            handle: Some(handle),
        });
    }

    /// Stops this meter's background ticker thread, if one is running, blocking
    /// until it has exited.
    ///
    /// A no-op if [`spawn_ticker`](Meter::spawn_ticker) was never called.
    pub fn stop_ticker(&self) {
        let ticker = self.ticker.lock().take();
        if let Some(mut ticker) = ticker {
            *ticker.stop.stopped.lock() = true;
            ticker.stop.condvar.notify_all();
            if let Some(handle) = ticker.handle.take() {
                if handle.join().is_err() {
                    log::warn!("meter background ticker thread panicked");
                }
            }
        }
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

// Modeled after Java metrics-core's EWMA.java, generalized to an arbitrary tick
// interval rather than a fixed five seconds.
struct Ewma {
    rate: f64,
    alpha: f64,
    interval_secs: f64,
    initialized: bool,
}

impl Ewma {
    fn new(minutes: f64, tick_interval: Duration) -> Ewma {
        let interval_secs = tick_interval.as_secs_f64().max(1.);
        Ewma {
            rate: 0.,
            alpha: 1. - (-interval_secs / SECONDS_PER_MINUTE / minutes).exp(),
            interval_secs,
            initialized: false,
        }
    }

    fn tick(&mut self, count: i64) {
        let instant_rate = count as f64 / self.interval_secs;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Equivalent to calling ewma.tick(0) `ticks` times, but isn't linear in `ticks`.
    ///
    /// x1 = x0 + alpha * (0 - x0)
    /// x1 = x0 - alpha * x0
    /// x1 = x0 * (1 - alpha)
    ///
    /// x2 = x1 * (1 - alpha)
    /// x2 = x0 * (1 - alpha) * (1 - alpha)
    fn decay(&mut self, ticks: u64) {
        match i32::try_from(ticks) {
            Ok(ticks) => self.rate *= (1. - self.alpha).powi(ticks),
            Err(_) => self.rate = 0.,
        }
    }

    fn get(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::test::TestClock;
    use assert_approx_eq::assert_approx_eq;

    fn meter_at(clock: Arc<TestClock>) -> Meter {
        Meter::new_with(clock, Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS))
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn starts_out_with_no_rates_or_count() {
        let clock = Arc::new(TestClock::new());
        let meter = meter_at(clock);

        assert_eq!(meter.count(), 0);
        assert_eq!(meter.one_minute_rate(), 0.);
        assert_eq!(meter.five_minute_rate(), 0.);
        assert_eq!(meter.fifteen_minute_rate(), 0.);
        assert_eq!(meter.mean_rate(), 0.);
    }

    #[test]
    fn marks_events_and_updates_rate_and_count() {
        let clock = Arc::new(TestClock::new());
        let meter = meter_at(clock.clone());

        meter.mark(1);
        clock.advance(Duration::from_secs(10));
        meter.mark(2);

        assert_approx_eq!(meter.mean_rate(), 0.3, 0.001);
        assert_approx_eq!(meter.one_minute_rate(), 0.1840, 0.001);
        assert_approx_eq!(meter.five_minute_rate(), 0.1966, 0.001);
        assert_approx_eq!(meter.fifteen_minute_rate(), 0.1988, 0.001);
    }

    #[test]
    fn one_minute_rate_converges_to_a_sustained_rate_within_tolerance() {
        let clock = Arc::new(TestClock::new());
        let meter = Meter::new_with(clock.clone(), Duration::from_secs(1));

        for _ in 0..(10 * 60) {
            meter.mark(1);
            clock.advance(Duration::from_secs(1));
        }

        let m1 = meter.one_minute_rate();
        assert!((m1 - 1.).abs() / 1. < 0.02, "m1 = {}", m1);
    }

    #[test]
    fn an_idle_meter_catches_up_in_a_single_jump() {
        let clock = Arc::new(TestClock::new());
        let meter = meter_at(clock.clone());

        meter.mark(5);
        clock.advance(Duration::from_secs(3600));

        // a single read ticks the meter all the way forward without panicking
        // or looping per-interval.
        assert_eq!(meter.count(), 5);
        assert!(meter.one_minute_rate() >= 0.);
    }

    #[test]
    fn spawn_ticker_and_stop_ticker_do_not_deadlock() {
        let meter = Arc::new(Meter::with_tick_interval(Duration::from_millis(20)));
        meter.spawn_ticker();
        meter.mark(1);
        std::thread::sleep(Duration::from_millis(50));
        meter.stop_ticker();

        assert_eq!(meter.count(), 1);
    }
}
