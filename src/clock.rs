//! Timestamp sources for latency measurement.
//!
//! A [`Clock`] hands out raw ticks and knows how many ticks make a second.
//! Ticks travel on the wire and are only converted to wall-clock units when the
//! report is generated, so both ends of a run must agree on the source.
//!
//! Two sources are provided:
//!
//! - [`MonotonicClock`]: `CLOCK_MONOTONIC` in nanoseconds. Portable and shared
//!   by every process on the host.
//! - [`TscClock`]: the x86_64 time-stamp counter, with its frequency calibrated
//!   once per process against the monotonic clock.
//!
//! Neither source is synchronized across hosts. When sender and receiver run on
//! different machines, per-packet latencies include the offset between the two
//! counters and should be read as relative values only.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// How long [`TscClock::calibrate`] samples the counter.
pub const CALIBRATION_WINDOW: Duration = Duration::from_millis(100);

/// A monotonic tick source with a fixed frequency.
pub trait Clock: Send + Sync {
    /// Current tick count. Never zero in practice.
    fn now(&self) -> u64;

    /// Ticks per second, constant for the lifetime of the process.
    fn frequency(&self) -> u64;

    /// Converts a tick difference to a [`Duration`].
    fn to_duration(&self, ticks: u64) -> Duration {
        ticks_to_duration(ticks, self.frequency())
    }
}

/// Converts `ticks` at `hz` ticks/second to whole microseconds.
pub fn ticks_to_micros(ticks: u64, hz: u64) -> u64 {
    if hz == 0 {
        return 0;
    }
    (ticks as u128 * 1_000_000 / hz as u128) as u64
}

/// Converts `ticks` at `hz` ticks/second to a [`Duration`].
pub fn ticks_to_duration(ticks: u64, hz: u64) -> Duration {
    if hz == 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as u128 * NANOS_PER_SEC as u128 / hz as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// `CLOCK_MONOTONIC` with nanosecond ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        // CLOCK_MONOTONIC is always available on supported targets.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        ts.tv_sec as u64 * NANOS_PER_SEC + ts.tv_nsec as u64
    }

    fn frequency(&self) -> u64 {
        NANOS_PER_SEC
    }
}

/// The x86_64 time-stamp counter.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    hz: u64,
}

#[cfg(target_arch = "x86_64")]
impl TscClock {
    /// Measures the counter frequency over [`CALIBRATION_WINDOW`].
    pub fn calibrate() -> Result<Self> {
        let reference = MonotonicClock;

        let start_ns = reference.now();
        let start_tsc = read_tsc();
        std::thread::sleep(CALIBRATION_WINDOW);
        let end_tsc = read_tsc();
        let end_ns = reference.now();

        let elapsed_ns = end_ns.saturating_sub(start_ns);
        let elapsed_tsc = end_tsc.saturating_sub(start_tsc);
        if elapsed_ns == 0 || elapsed_tsc == 0 {
            return Err(Error::Clock(
                "time-stamp counter did not advance during calibration".to_string(),
            ));
        }

        let hz = (elapsed_tsc as u128 * NANOS_PER_SEC as u128 / elapsed_ns as u128) as u64;
        log::debug!("Calibrated TSC at {} Hz", hz);
        Ok(Self { hz })
    }
}

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
fn read_tsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "x86_64")]
impl Clock for TscClock {
    fn now(&self) -> u64 {
        read_tsc()
    }

    fn frequency(&self) -> u64 {
        self.hz
    }
}

/// Selects which [`Clock`] a run uses.
///
/// # Examples
///
/// ```
/// use udpprobe::clock::ClockSource;
///
/// let source: ClockSource = "monotonic".parse().unwrap();
/// assert_eq!(source, ClockSource::Monotonic);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    /// Portable `CLOCK_MONOTONIC`
    #[default]
    Monotonic,
    /// x86_64 time-stamp counter
    Tsc,
}

impl ClockSource {
    /// Instantiates the clock, calibrating it if needed.
    pub fn build(self) -> Result<Arc<dyn Clock>> {
        match self {
            ClockSource::Monotonic => Ok(Arc::new(MonotonicClock)),
            #[cfg(target_arch = "x86_64")]
            ClockSource::Tsc => Ok(Arc::new(TscClock::calibrate()?)),
            #[cfg(not(target_arch = "x86_64"))]
            ClockSource::Tsc => Err(Error::Clock(
                "the TSC clock is only available on x86_64".to_string(),
            )),
        }
    }

    /// [`build`](Self::build) on the blocking pool, so TSC calibration does
    /// not stall the async runtime for [`CALIBRATION_WINDOW`].
    pub async fn build_async(self) -> Result<Arc<dyn Clock>> {
        tokio::task::spawn_blocking(move || self.build())
            .await
            .map_err(|e| Error::Clock(format!("clock setup task failed: {}", e)))?
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSource::Monotonic => write!(f, "monotonic"),
            ClockSource::Tsc => write!(f, "tsc"),
        }
    }
}

impl FromStr for ClockSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "monotonic" => Ok(ClockSource::Monotonic),
            "tsc" => Ok(ClockSource::Tsc),
            other => Err(Error::Config(format!("unknown clock source '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock;
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.now();

        assert!(a > 0);
        assert!(b > a);
        assert_eq!(clock.frequency(), NANOS_PER_SEC);
    }

    #[test]
    fn test_tick_conversions() {
        assert_eq!(ticks_to_micros(3_000, 1_000_000_000), 3);
        assert_eq!(ticks_to_micros(2_500_000_000, 2_500_000_000), 1_000_000);
        assert_eq!(ticks_to_micros(10, 0), 0);

        assert_eq!(
            ticks_to_duration(1_500_000_000, 1_000_000_000),
            Duration::from_millis(1500)
        );
        assert_eq!(MonotonicClock.to_duration(250), Duration::from_nanos(250));
    }

    #[test]
    fn test_large_tick_counts_do_not_overflow() {
        // A day's worth of ticks at 4 GHz.
        let ticks = 4_000_000_000u64 * 86_400;
        assert_eq!(ticks_to_micros(ticks, 4_000_000_000), 86_400_000_000);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_build_async_leaves_runtime_responsive() {
        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
        });

        let clock = ClockSource::Monotonic.build_async().await.unwrap();
        assert_eq!(clock.frequency(), NANOS_PER_SEC);
        ticker.await.unwrap();
    }

    #[cfg(target_arch = "x86_64")]
    #[tokio::test(flavor = "current_thread")]
    async fn test_tsc_calibration_runs_off_the_runtime_thread() {
        // A timer shorter than the calibration window must fire while the
        // calibration is still in progress.
        let started = std::time::Instant::now();
        let ticker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });

        let clock = ClockSource::Tsc.build_async().await.unwrap();
        let ticked_after = ticker.await.unwrap();

        assert!(clock.frequency() > 0);
        assert!(ticked_after < CALIBRATION_WINDOW);
    }

    #[test]
    fn test_clock_source_parsing() {
        assert_eq!("TSC".parse::<ClockSource>().unwrap(), ClockSource::Tsc);
        assert_eq!(
            "monotonic".parse::<ClockSource>().unwrap(),
            ClockSource::Monotonic
        );
        assert!("hpet".parse::<ClockSource>().is_err());
        assert_eq!(ClockSource::Tsc.to_string(), "tsc");
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_tsc_calibration() {
        let clock = TscClock::calibrate().expect("calibration failed");
        assert!(clock.frequency() > 0);
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
