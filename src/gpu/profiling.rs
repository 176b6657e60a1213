//! Named timing zones for GPU transfers.

use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

/// Accumulated wall time and call count for one named operation.
#[derive(Debug)]
pub struct ProfilingZone {
    name: &'static str,
    nanos: AtomicU64,
    count: AtomicU64,
}

/// Time spent writing pixels into textures.
pub static TEXTURE_DOWNLOAD: ProfilingZone = ProfilingZone::new("texture download");

/// Time spent reading pixels back from textures.
pub static TEXTURE_READBACK: ProfilingZone = ProfilingZone::new("texture readback");

impl ProfilingZone {
    /// Empty zone.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            nanos: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Zone name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Start timing; the elapsed time is added when the guard drops.
    #[must_use]
    pub fn scope(&'static self) -> ScopeTimer {
        ScopeTimer {
            zone: self,
            start: Instant::now(),
        }
    }

    /// Total time recorded.
    #[must_use]
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    /// Number of completed scopes.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean time per scope, zero if nothing was recorded.
    #[must_use]
    pub fn average(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            n => self.total() / n as u32,
        }
    }

    fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.nanos.fetch_add(nanos, Ordering::Relaxed);
        let _ = self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Log the accumulated totals at debug level.
    pub fn log(&self) {
        log::debug!(
            "{}: {} calls, {:?} total, {:?} average",
            self.name,
            self.count(),
            self.total(),
            self.average()
        );
    }
}

/// Adds its lifetime to a [`ProfilingZone`] on drop.
#[derive(Debug)]
pub struct ScopeTimer {
    zone: &'static ProfilingZone,
    start: Instant,
}

impl Drop for ScopeTimer {
    fn drop(&mut self) {
        self.zone.record(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ZONE: ProfilingZone = ProfilingZone::new("test zone");

    #[test]
    fn scopes_accumulate() {
        for _ in 0..3 {
            let _timer = ZONE.scope();
        }
        assert_eq!(ZONE.count(), 3);
        assert!(ZONE.average() <= ZONE.total());
        assert_eq!(ZONE.name(), "test zone");
    }
}
