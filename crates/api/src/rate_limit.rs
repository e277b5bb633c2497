use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window limiter keyed by caller (sender number or forwarded IP).
#[derive(Debug, Clone)]
pub struct SenderRateLimiter {
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl SenderRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            hits: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock();

        // Forget callers whose whole history fell out of the window.
        hits.retain(|_, queue| {
            queue
                .back()
                .map(|last| now.duration_since(*last) <= self.window)
                .unwrap_or(false)
        });

        let queue = hits.entry(key.to_string()).or_default();
        while queue
            .front()
            .is_some_and(|first| now.duration_since(*first) > self.window)
        {
            queue.pop_front();
        }

        if queue.len() >= self.max_requests {
            return false;
        }

        queue.push_back(now);
        true
    }
}
