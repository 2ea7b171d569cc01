//! Orientation Sensor Feed
//!
//! Adapts raw device-orientation readings into the sample stream consumed by
//! the [`OrientationMapper`](crate::domain::controller::OrientationMapper):
//! readings are rounded to whole degrees, rate limited and deduplicated.

use crate::domain::models::Orientation;
use crate::error::SensorError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default sampling rate of the feed
pub const SAMPLE_RATE_HZ: u32 = 30;

/// Raw reading as delivered by the platform; components are missing when the
/// device has no orientation sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawOrientation {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

impl RawOrientation {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }
}

/// A source of orientation samples.
///
/// `Ok(None)` marks the end of the stream.
pub trait OrientationSource {
    fn next_sample(
        &mut self,
    ) -> impl Future<Output = Result<Option<Orientation>, SensorError>> + Send;
}

/// Rounding, throttling and deduplication of raw readings
#[derive(Debug, Clone)]
pub struct SampleFilter {
    min_interval: Duration,
    last_accepted_at: Option<Instant>,
    last: Option<Orientation>,
}

impl SampleFilter {
    pub fn new(rate_hz: u32) -> Self {
        let rate_hz = rate_hz.max(1) as u64;
        Self {
            min_interval: Duration::from_millis((1000 + rate_hz / 2) / rate_hz),
            last_accepted_at: None,
            last: None,
        }
    }

    /// Forget throttling and deduplication history
    pub fn reset(&mut self) {
        self.last_accepted_at = None;
        self.last = None;
    }

    /// Returns the sample to deliver, or `None` when it is throttled or unchanged
    pub fn accept(
        &mut self,
        raw: RawOrientation,
        now: Instant,
    ) -> Result<Option<Orientation>, SensorError> {
        let (Some(alpha), Some(beta), Some(gamma)) = (raw.alpha, raw.beta, raw.gamma) else {
            return Err(SensorError::Unsupported);
        };

        if let Some(at) = self.last_accepted_at {
            if now.saturating_duration_since(at) < self.min_interval {
                return Ok(None);
            }
        }
        self.last_accepted_at = Some(now);

        let sample = Orientation::new(alpha.round(), beta.round(), gamma.round());
        if self.last == Some(sample) {
            return Ok(None);
        }

        self.last = Some(sample);
        Ok(Some(sample))
    }
}

/// Orientation source fed by a channel of raw readings
pub struct OrientationFeed {
    readings: mpsc::Receiver<RawOrientation>,
    filter: SampleFilter,
}

impl OrientationFeed {
    pub fn new(readings: mpsc::Receiver<RawOrientation>) -> Self {
        Self::with_rate(readings, SAMPLE_RATE_HZ)
    }

    pub fn with_rate(readings: mpsc::Receiver<RawOrientation>, rate_hz: u32) -> Self {
        Self {
            readings,
            filter: SampleFilter::new(rate_hz),
        }
    }

    /// Start over with a new reading channel
    pub fn restart(&mut self, readings: mpsc::Receiver<RawOrientation>) {
        self.readings = readings;
        self.filter.reset();
    }
}

impl OrientationSource for OrientationFeed {
    async fn next_sample(&mut self) -> Result<Option<Orientation>, SensorError> {
        while let Some(raw) = self.readings.recv().await {
            if let Some(sample) = self.filter.accept(raw, Instant::now())? {
                return Ok(Some(sample));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_and_deduplicates() {
        let mut filter = SampleFilter::new(30);
        let start = Instant::now();

        let first = filter
            .accept(RawOrientation::new(10.4, 20.6, -3.2), start)
            .unwrap();
        assert_eq!(first, Some(Orientation::new(10.0, 21.0, -3.0)));

        let same = filter
            .accept(
                RawOrientation::new(9.6, 21.2, -2.9),
                start + Duration::from_millis(100),
            )
            .unwrap();
        assert_eq!(same, None);

        let changed = filter
            .accept(
                RawOrientation::new(12.0, 21.0, -3.0),
                start + Duration::from_millis(200),
            )
            .unwrap();
        assert_eq!(changed, Some(Orientation::new(12.0, 21.0, -3.0)));
    }

    #[test]
    fn test_throttles_to_rate() {
        let mut filter = SampleFilter::new(30);
        let start = Instant::now();

        assert!(filter
            .accept(RawOrientation::new(0.0, 0.0, 0.0), start)
            .unwrap()
            .is_some());
        assert_eq!(
            filter
                .accept(
                    RawOrientation::new(5.0, 0.0, 0.0),
                    start + Duration::from_millis(10)
                )
                .unwrap(),
            None
        );
        assert!(filter
            .accept(
                RawOrientation::new(5.0, 0.0, 0.0),
                start + Duration::from_millis(40)
            )
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_missing_components_are_unsupported() {
        let mut filter = SampleFilter::new(30);
        let raw = RawOrientation {
            alpha: Some(1.0),
            beta: None,
            gamma: Some(2.0),
        };
        assert_eq!(
            filter.accept(raw, Instant::now()),
            Err(SensorError::Unsupported)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_delivers_until_closed_and_restarts() {
        let (tx, rx) = mpsc::channel(8);
        let mut feed = OrientationFeed::new(rx);

        tx.send(RawOrientation::new(1.0, 2.0, 3.0)).await.unwrap();
        tx.send(RawOrientation::new(1.0, 2.0, 3.0)).await.unwrap();
        drop(tx);

        assert_eq!(
            feed.next_sample().await.unwrap(),
            Some(Orientation::new(1.0, 2.0, 3.0))
        );
        assert_eq!(feed.next_sample().await.unwrap(), None);

        let (tx, rx) = mpsc::channel(8);
        feed.restart(rx);
        tx.send(RawOrientation::new(1.0, 2.0, 3.0)).await.unwrap();
        assert_eq!(
            feed.next_sample().await.unwrap(),
            Some(Orientation::new(1.0, 2.0, 3.0))
        );
    }
}
