//! Logging and tracing initialization.
//!
//! Structured logging via the `tracing` ecosystem: pretty console output by
//! default, JSON when the daemon feeds a log collector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
#[derive(Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
}

/// Initialize the tracing subscriber. Call once, early in main(), after the
/// config is loaded. `RUST_LOG` overrides the level at runtime.
pub fn init(config: LogConfig) {
    let default_directive = if config.verbose {
        "shelfd=debug"
    } else {
        "shelfd=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_file(false))
            .init();
    }
}

/// Rate limiter for repetitive log lines, used for per-chunk transfer
/// progress that would otherwise flood the output.
///
/// Thread-safe; losing the update race means another thread just logged.
pub struct LogThrottle {
    interval: Duration,
    /// Elapsed-millis of the last log plus one; 0 means never logged.
    stamp: AtomicU64,
    epoch: Instant,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stamp: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Returns true if enough time has passed since the last log.
    pub fn should_log(&self) -> bool {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.stamp.load(Ordering::Relaxed);

        let due = match last {
            0 => true,
            stamp => now.saturating_sub(stamp - 1) >= self.interval.as_millis() as u64,
        };
        if !due {
            return false;
        }

        self.stamp
            .compare_exchange(last, now + 1, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Reset the throttle, allowing the next log immediately.
    pub fn reset(&self) {
        self.stamp.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_allows_first_log() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log());
    }

    #[test]
    fn throttle_blocks_immediate_second_log() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
    }

    #[test]
    fn throttle_reset_allows_log() {
        let throttle = LogThrottle::new(Duration::from_secs(100));
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
        throttle.reset();
        assert!(throttle.should_log());
    }

    #[test]
    fn throttle_reopens_after_the_interval() {
        let throttle = LogThrottle::new(Duration::from_millis(10));
        assert!(throttle.should_log());
        std::thread::sleep(Duration::from_millis(20));
        assert!(throttle.should_log());
    }
}
