//! Sliding-window frame-rate estimator
//!
//! Each stream keeps two of these: one fed with host receipt time and one fed
//! with the device capture timestamp, so host-side stalls and device-side
//! drops show up as a gap between the two rates.

use std::time::Instant;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

pub const DEFAULT_WINDOW: usize = 30;

/// Fixed-size FIFO of sample timestamps (seconds)
pub struct FpsWindow {
    samples: HeapRb<f64>,
    rate: f64,
    origin: Instant,
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl FpsWindow {
    pub fn new(window: usize) -> Self {
        Self {
            samples: HeapRb::new(window.max(1)),
            rate: 0.0,
            origin: Instant::now(),
        }
    }

    /// Record a sample at the current host monotonic time.
    pub fn update(&mut self) {
        let now = self.origin.elapsed().as_secs_f64();
        self.update_at(now);
    }

    /// Record a sample at `timestamp` seconds.
    ///
    /// The rate is the number of samples already held divided by the span
    /// from the oldest of them to `timestamp`. A zero or negative span keeps
    /// the previous rate. Once full, the oldest sample is evicted.
    pub fn update_at(&mut self, timestamp: f64) {
        let count = self.samples.occupied_len();
        if let Some(&oldest) = self.samples.try_peek() {
            let span = timestamp - oldest;
            if count > 0 && span > 0.0 && span.is_finite() {
                self.rate = count as f64 / span;
            }
        }
        self.samples.push_overwrite(timestamp);
    }

    /// Last computed rate, 0 until two samples have been seen.
    pub fn get(&self) -> f64 {
        self.rate
    }

    pub fn len(&self) -> usize {
        self.samples.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sample_has_no_rate() {
        let mut fps = FpsWindow::default();
        assert_eq!(fps.get(), 0.0);
        fps.update_at(5.0);
        assert_eq!(fps.get(), 0.0);
    }

    #[test]
    fn two_samples_one_second_apart() {
        let mut fps = FpsWindow::default();
        fps.update_at(0.0);
        fps.update_at(1.0);
        assert!((fps.get() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn window_is_bounded() {
        let mut fps = FpsWindow::new(DEFAULT_WINDOW);
        for i in 0..=DEFAULT_WINDOW {
            fps.update_at(i as f64 / 30.0);
        }
        assert_eq!(fps.len(), DEFAULT_WINDOW);
        assert!((fps.get() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_timestamp_keeps_rate_finite() {
        let mut fps = FpsWindow::default();
        fps.update_at(2.0);
        fps.update_at(2.0);
        assert_eq!(fps.get(), 0.0);
        fps.update_at(3.0);
        assert!(fps.get().is_finite());
        assert!(fps.get() > 0.0);
    }

    #[test]
    fn host_clock_update() {
        let mut fps = FpsWindow::default();
        fps.update();
        std::thread::sleep(std::time::Duration::from_millis(5));
        fps.update();
        assert!(fps.get() > 0.0);
    }
}
