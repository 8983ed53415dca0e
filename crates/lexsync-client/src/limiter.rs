//! Per-connection token-bucket rate limiting

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket per connection id. `burst` tokens are available immediately;
/// the bucket refills at `per_second` tokens per second.
pub struct RateLimiter {
    burst: u32,
    per_second: f64,
    buckets: Mutex<HashMap<i32, Bucket>>,
}

impl RateLimiter {
    pub fn new(burst: u32, per_second: f64) -> Self {
        Self {
            burst,
            per_second,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the connection's bucket has a token, then take it.
    pub async fn acquire(&self, connection_id: i32) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                let bucket = buckets.entry(connection_id).or_insert(Bucket {
                    tokens: self.burst as f64,
                    last_refill: now,
                });

                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens =
                    (bucket.tokens + elapsed * self.per_second).min(self.burst as f64);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64(
                        (1.0 - bucket.tokens) / self.per_second,
                    ))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!(
                        connection_id,
                        delay_ms = delay.as_millis() as u64,
                        "rate limiter waiting for capacity"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
