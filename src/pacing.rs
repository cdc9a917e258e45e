use std::time::Duration;

/// Fixed delay inserted by callers between logical operations to stay under
/// burst rate limits. Independent of the client's retry backoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Negative or non-finite values disable pacing.
    pub fn from_secs_f64(seconds: f64) -> Self {
        Self::new(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO))
    }

    #[cfg(test)]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secs() {
        assert_eq!(Pacer::from_secs_f64(0.25).delay(), Duration::from_millis(250));
        assert_eq!(Pacer::from_secs_f64(-1.0).delay(), Duration::ZERO);
        assert_eq!(Pacer::from_secs_f64(f64::NAN).delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pause_sleeps_for_delay() {
        let pacer = Pacer::new(Duration::from_millis(20));
        let started = std::time::Instant::now();
        pacer.pause().await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
