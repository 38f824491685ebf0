// zebpay-common/src/throttle.rs
// Weighted request gate shared by every REST call path.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum ThrottlerError {
    #[error("request weight {weight} exceeds throttler capacity {capacity}")]
    WeightExceedsCapacity { weight: u32, capacity: u32 },
}

/// Rolling-window weighted throttler. `acquire(weight)` suspends the caller
/// until the window has room for the request; spent weight expires on its
/// own after one period, there is no explicit release.
#[derive(Debug)]
pub struct Throttler {
    capacity: u32,
    period: Duration,
    spent: Mutex<VecDeque<(Instant, u32)>>,
}

impl Throttler {
    pub fn new(capacity: u32, period: Duration) -> Self {
        Self {
            capacity,
            period,
            spent: Mutex::new(VecDeque::new()),
        }
    }

    /// Exchange default budget: weight 4 per rolling second.
    pub fn default_rest() -> Self {
        Self::new(4, Duration::from_secs(1))
    }

    pub async fn acquire(&self, weight: u32) -> Result<(), ThrottlerError> {
        if weight > self.capacity {
            return Err(ThrottlerError::WeightExceedsCapacity {
                weight,
                capacity: self.capacity,
            });
        }
        loop {
            let wait = {
                let mut spent = self.spent.lock().await;
                let now = Instant::now();
                while let Some(&(at, _)) = spent.front() {
                    if now.duration_since(at) >= self.period {
                        spent.pop_front();
                    } else {
                        break;
                    }
                }
                let used: u32 = spent.iter().map(|&(_, w)| w).sum();
                if used + weight <= self.capacity {
                    spent.push_back((now, weight));
                    return Ok(());
                }
                // Oldest spend expires first; sleep until it does.
                let (oldest, _) = spent[0];
                (oldest + self.period).duration_since(now)
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_capacity_is_immediate() {
        let throttler = Throttler::new(4, Duration::from_secs(1));
        for _ in 0..4 {
            throttler.acquire(1).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_until_window_rolls() {
        let throttler = Throttler::new(2, Duration::from_secs(1));
        throttler.acquire(2).await.unwrap();

        let start = Instant::now();
        throttler.acquire(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_weight_accounting() {
        let throttler = Throttler::new(4, Duration::from_secs(1));
        throttler.acquire(3).await.unwrap();
        throttler.acquire(1).await.unwrap();

        let start = Instant::now();
        throttler.acquire(4).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_oversized_weight_rejected() {
        let throttler = Throttler::new(4, Duration::from_secs(1));
        let err = throttler.acquire(5).await.unwrap_err();
        assert!(matches!(
            err,
            ThrottlerError::WeightExceedsCapacity { weight: 5, capacity: 4 }
        ));
    }
}
