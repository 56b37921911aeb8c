//! Per-user sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Independent rate-limit buckets. All classes share the same ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    Ask,
    Message,
    Reply,
}

pub struct RateLimiter {
    limit: usize,
    window: Duration,
    windows: Mutex<Windows>,
}

#[derive(Default)]
struct Windows {
    calls: HashMap<(i64, CommandClass), VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl Windows {
    /// Forgets pairs whose newest call left the window. Runs at most once per
    /// window so the cost stays amortized.
    fn sweep(&mut self, now: Instant, window: Duration) {
        if self
            .last_sweep
            .is_some_and(|at| now.saturating_duration_since(at) <= window)
        {
            return;
        }
        self.calls.retain(|_, calls| {
            calls
                .back()
                .is_some_and(|newest| now.saturating_duration_since(*newest) <= window)
        });
        self.last_sweep = Some(now);
    }
}

impl RateLimiter {
    /// `limit` calls per minute for each (user, class) pair.
    pub fn new(limit: usize) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub async fn allow(&self, user_id: i64, class: CommandClass) -> bool {
        self.allow_at(user_id, class, Instant::now()).await
    }

    /// Drops timestamps that aged out of the window, then admits and records
    /// the call only while under the ceiling. Rejected calls leave no trace.
    pub async fn allow_at(&self, user_id: i64, class: CommandClass, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;
        windows.sweep(now, self.window);
        let calls = windows.calls.entry((user_id, class)).or_default();

        while let Some(oldest) = calls.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.limit {
            return false;
        }

        calls.push_back(now);
        true
    }

    /// Number of (user, class) pairs currently remembered.
    pub async fn tracked(&self) -> usize {
        self.windows.lock().await.calls.len()
    }
}
