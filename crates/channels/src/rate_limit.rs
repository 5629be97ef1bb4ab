/// Token-bucket pacing for outbound sends.
///
/// Callers `await` on `acquire()` before sending; the call returns immediately when a token
/// is available, or sleeps until the next refill.
///
/// Default: burst of 3, then 1 msg/s, comfortably below the platform flood threshold for a
/// user account.
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_BURST: u32 = 3;
pub const DEFAULT_PER_SECOND: f64 = 1.0;

struct TokenBucket {
    capacity: u32,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, per_second: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate: per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Consumes one token, or returns how long to wait for the next one.
    fn try_consume(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let needed = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }
}

pub struct OutboundLimiter(Mutex<TokenBucket>);

impl OutboundLimiter {
    pub fn new(burst: u32, per_second: f64) -> Self {
        Self(Mutex::new(TokenBucket::new(burst.max(1), per_second.max(0.01))))
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.0.lock().await;
                bucket.try_consume()
            };
            match wait {
                None => return,
                Some(d) => {
                    tracing::trace!(wait_ms = d.as_millis() as u64, "Outbound limiter waiting");
                    tokio::time::sleep(d).await
                }
            }
        }
    }
}

impl Default for OutboundLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_PER_SECOND)
    }
}
