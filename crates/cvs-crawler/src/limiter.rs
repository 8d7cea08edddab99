use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{self, Instant};
use url::Url;

use crate::config::Throttle;
use crate::scope::window_key;

/// Spaces request starts per domain window.
///
/// Each call to [`DomainLimiter::acquire`] books the next free slot of the
/// url's window and sleeps until it. Slots are `delay + U[0, jitter]` apart,
/// whatever the number of concurrent downloads.
#[derive(Debug, Clone)]
pub struct DomainLimiter {
    delay: Duration,
    jitter: Duration,
    next_slots: Arc<Mutex<HashMap<String, Instant>>>,
}

impl DomainLimiter {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Self {
            delay,
            jitter,
            next_slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_throttle(throttle: Option<&Throttle>) -> Option<Self> {
        throttle
            .and_then(Throttle::spacing)
            .map(|(delay, jitter)| Self::new(delay, jitter))
    }

    fn gap(&self) -> Duration {
        if self.jitter.is_zero() {
            self.delay
        } else {
            self.delay + self.jitter.mul_f64(rand::random::<f64>())
        }
    }

    fn book(&self, key: String) -> Instant {
        let now = Instant::now();
        let gap = self.gap();
        let mut slots = match self.next_slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = slots
            .get(&key)
            .copied()
            .filter(|next| *next > now)
            .unwrap_or(now);
        slots.insert(key, slot + gap);
        slot
    }

    pub async fn acquire(&self, url: &Url) {
        let slot = self.book(window_key(url));
        time::sleep_until(slot).await;
    }
}
