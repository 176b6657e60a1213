//! Lazily queried hardware capabilities.

use std::cell::{Cell, OnceCell, RefCell};

use crate::gpu::driver::{DriverLimits, GpuDriver};
use crate::pixel::format::ApiProfile;

/// Capabilities of one context, fetched from the driver on first use and
/// kept for the context's lifetime.
#[derive(Debug, Default)]
pub struct Capabilities {
    limits: OnceCell<DriverLimits>,
    memory_info: Cell<Option<bool>>,
}

impl Capabilities {
    /// Driver limits, querying them on first call.
    pub fn limits(&self, driver: &RefCell<Box<dyn GpuDriver>>) -> &DriverLimits {
        self.limits.get_or_init(|| {
            let limits = driver.borrow_mut().query_limits();
            log::debug!(
                "queried capabilities: max texture {}, {:?} profile",
                limits.max_texture_size,
                limits.profile
            );
            limits
        })
    }

    /// Whether used video memory can be queried.
    pub fn has_memory_info(&self, driver: &RefCell<Box<dyn GpuDriver>>) -> bool {
        if let Some(known) = self.memory_info.get() {
            return known;
        }
        let known = self.limits(driver).memory_info;
        if !known {
            log::debug!("video memory usage not reported by this driver");
        }
        self.memory_info.set(Some(known));
        known
    }

    /// Used video memory; asked of the driver every time.
    pub fn video_mem_used(&self, driver: &RefCell<Box<dyn GpuDriver>>) -> Option<u64> {
        if self.has_memory_info(driver) {
            driver.borrow_mut().video_mem_used()
        } else {
            None
        }
    }

    /// Whether capabilities were already fetched.
    #[must_use]
    pub fn is_queried(&self) -> bool {
        self.limits.get().is_some()
    }
}

impl DriverLimits {
    /// Whether the API family is the embedded one.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.profile == ApiProfile::Embedded
    }

    /// Whether `wanted` occurs in the vendor string, ignoring case.
    #[must_use]
    pub fn is_vendor(&self, wanted: &str) -> bool {
        self.vendor.to_lowercase().contains(&wanted.to_lowercase())
    }

    /// Next supported multisample count after `current`, wrapping around to
    /// the smallest.
    #[must_use]
    pub fn next_multisample_value(&self, current: u32) -> u32 {
        self.sample_counts
            .iter()
            .copied()
            .find(|&count| count > current)
            .or_else(|| self.sample_counts.first().copied())
            .unwrap_or(1)
    }

    /// Log every capability at info level.
    pub fn log(&self) {
        log::info!("graphics vendor: {}", self.vendor);
        log::info!("graphics version: {}", self.version);
        log::info!("API profile: {:?}", self.profile);
        log::info!("max texture size: {}", self.max_texture_size);
        log::info!("power-of-two textures required: {}", self.requires_pot);
        log::info!("float textures: {}", self.supports_float);
        log::info!("pixel buffers: {}", self.supports_pixel_buffers);
        log::info!("min/max blending: {}", self.min_max_blend);
        log::info!("multisample counts: {:?}", self.sample_counts);
        match self.video_mem_installed {
            Some(bytes) => log::info!("video memory installed: {} MB", bytes >> 20),
            None => log::info!("video memory installed: unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{HeadlessDriver, HeadlessLimits};

    #[test]
    fn limits_are_queried_once() {
        let driver = HeadlessDriver::new(HeadlessLimits::default());
        let probe = driver.probe();
        let driver: RefCell<Box<dyn GpuDriver>> = RefCell::new(Box::new(driver));
        let caps = Capabilities::default();
        assert!(!caps.is_queried());
        for _ in 0..4 {
            let _ = caps.limits(&driver).max_texture_size;
            let _ = caps.has_memory_info(&driver);
        }
        assert_eq!(probe.limits_queries(), 1);
    }

    #[test]
    fn used_memory_is_requeried() {
        let driver = HeadlessDriver::new(HeadlessLimits::default());
        let probe = driver.probe();
        let driver: RefCell<Box<dyn GpuDriver>> = RefCell::new(Box::new(driver));
        let caps = Capabilities::default();
        let before = caps.video_mem_used(&driver);
        probe.set_video_mem_used(1 << 20);
        assert_ne!(caps.video_mem_used(&driver), before);
        assert_eq!(caps.video_mem_used(&driver), Some(1 << 20));
    }

    #[test]
    fn multisample_steps_and_wraps() {
        let limits = HeadlessLimits::default().to_driver_limits();
        assert_eq!(limits.sample_counts, vec![1, 2, 4, 8]);
        assert_eq!(limits.next_multisample_value(1), 2);
        assert_eq!(limits.next_multisample_value(4), 8);
        assert_eq!(limits.next_multisample_value(8), 1);
        assert_eq!(limits.next_multisample_value(3), 4);
    }

    #[test]
    fn vendor_match_ignores_case() {
        let limits = HeadlessLimits::default().to_driver_limits();
        assert!(limits.is_vendor("TESSERA"));
        assert!(!limits.is_vendor("nvidia"));
    }
}
