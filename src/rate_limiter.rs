use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter bounding outbound calls per trailing minute.
///
/// Each admitted call records its timestamp; timestamps older than the
/// window are pruned before every check. When the window is full the caller
/// sleeps until the oldest recorded call ages out.
#[derive(Debug)]
pub struct RateLimiter {
    calls_per_minute: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(calls_per_minute: usize) -> Self {
        Self {
            calls_per_minute,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Suspend until issuing one more call keeps the trailing-minute count
    /// at or under the configured limit, then record the call.
    pub async fn wait_if_needed(&self) {
        let mut calls = self.calls.lock().await;

        let now = Instant::now();
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= WINDOW {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.calls_per_minute {
            if let Some(oldest) = calls.front() {
                // Never negative: saturating_sub clamps to zero
                let wait = WINDOW.saturating_sub(now.duration_since(*oldest));
                if !wait.is_zero() {
                    debug!("Rate limit reached, waiting {:.1}s", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
                calls.pop_front();
            }
        }

        calls.push_back(Instant::now());
    }
}
