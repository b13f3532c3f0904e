//! Monotonic millisecond clock for [`OtaAgent::tick`](crate::ota::OtaAgent::tick).
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` (microsecond
//!   precision, monotonic since boot).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for host
//!   runs and tests.

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since this clock was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
