//! Rate limiting of published progress

use super::constants::REPOSITORY_PROGRESS_CEILING;
use super::ProgressUpdate;
use std::time::{Duration, Instant};

/// Publishes at most one update per interval and never goes backwards.
///
/// The window starts when the throttle is created, so an update arriving
/// within the first interval is dropped.
#[derive(Debug)]
pub struct ProgressThrottle {
	interval: Duration,
	last_publish: Instant,
	last_percentage: f64,
}

impl ProgressThrottle {
	pub fn new(interval: Duration) -> Self {
		Self::starting_at(interval, Instant::now())
	}

	pub fn starting_at(interval: Duration, start: Instant) -> Self {
		ProgressThrottle { interval, last_publish: start, last_percentage: 0.0 }
	}

	pub fn offer(&mut self, update: ProgressUpdate) -> Option<ProgressUpdate> {
		self.offer_at(Instant::now(), update)
	}

	/// Decide whether `update` observed at `now` is published
	pub fn offer_at(&mut self, now: Instant, update: ProgressUpdate) -> Option<ProgressUpdate> {
		if update.percentage < self.last_percentage {
			return None;
		}
		if now.saturating_duration_since(self.last_publish) <= self.interval {
			return None;
		}
		self.last_publish = now;
		self.last_percentage = update.percentage;
		Some(update)
	}

	/// Start over for a new operation
	pub fn reset(&mut self) {
		self.last_publish = Instant::now();
		self.last_percentage = 0.0;
	}
}

/// Repository progress ignores sub-1% noise and stays below 100 until the operation returns
pub fn clamp_repository_progress(mut update: ProgressUpdate) -> Option<ProgressUpdate> {
	if update.percentage < 1.0 {
		return None;
	}
	if update.percentage > REPOSITORY_PROGRESS_CEILING {
		update.percentage = REPOSITORY_PROGRESS_CEILING;
	}
	Some(update)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn update(percentage: f64) -> ProgressUpdate {
		ProgressUpdate { percentage, speed: 0.0, information: String::new() }
	}

	#[test]
	fn test_first_update_inside_window_is_dropped() {
		let start = Instant::now();
		let mut throttle = ProgressThrottle::starting_at(Duration::from_secs(1), start);
		assert!(throttle.offer_at(start + Duration::from_millis(500), update(10.0)).is_none());
		assert!(throttle.offer_at(start + Duration::from_secs(1), update(10.0)).is_none());
		assert!(throttle.offer_at(start + Duration::from_millis(1001), update(10.0)).is_some());
	}

	#[test]
	fn test_rate_limited_and_monotonic() {
		let start = Instant::now();
		let mut throttle = ProgressThrottle::starting_at(Duration::from_secs(1), start);
		let mut published = Vec::new();

		let feed = [5.0, 30.0, 20.0, 25.0, 60.0, 40.0, 80.0, 75.0, 100.0];
		for (i, pct) in feed.iter().enumerate() {
			let at = start + Duration::from_millis(600 * (i as u64 + 1));
			if let Some(u) = throttle.offer_at(at, update(*pct)) {
				published.push((at, u.percentage));
			}
		}

		assert!(!published.is_empty());
		for pair in published.windows(2) {
			assert!(pair[1].1 >= pair[0].1);
			assert!(pair[1].0 - pair[0].0 > Duration::from_secs(1));
		}
	}

	#[test]
	fn test_repository_clamp() {
		assert!(clamp_repository_progress(update(0.5)).is_none());
		assert_eq!(clamp_repository_progress(update(100.0)).map(|u| u.percentage), Some(99.0));
		assert_eq!(clamp_repository_progress(update(42.0)).map(|u| u.percentage), Some(42.0));
	}
}

// vim: ts=4
