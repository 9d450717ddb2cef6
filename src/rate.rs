//! Sliding-window request admission.
//!
//! [`RateLimiter`] gates outbound requests so that no more than the budgeted
//! number occur in any trailing window (one minute in production). The window
//! is a deque of admission instants guarded by a single mutex; entries are
//! evicted lazily from the front on every check, so no background timer is
//! needed and the admission decision is a pure function of the clock and the
//! window contents.
//!
//! A token-weighted variant (window of token counts compared by running sum
//! against a tokens-per-minute budget) slots into the same structure; only
//! the request-count limiter is wired up.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Length of the trailing window.
const WINDOW: Duration = Duration::from_secs(60);

/// Admission controller enforcing a requests-per-window budget.
///
/// Shared across workers behind an `Arc`; the only entry point is
/// [`admit`](Self::admit). The mutex is held for the O(window) evict-and-append
/// only, never across a sleep or a network call.
pub struct RateLimiter {
    budget: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_minute` admissions in any
    /// trailing 60-second window.
    ///
    /// The budget must be at least 1; configuration validation rejects zero
    /// budgets before the dispatcher starts.
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, WINDOW)
    }

    /// Create a limiter with a custom window length.
    pub fn with_window(budget: u32, window: Duration) -> Self {
        Self {
            budget: budget as usize,
            window,
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    /// Block until issuing a request stays within the budget, then record the
    /// admission and return.
    ///
    /// When the window is full the caller sleeps until the oldest admission
    /// ages out, then re-checks; one slot is enough to admit, and eviction is
    /// re-applied on every pass.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut admissions = self.admissions.lock().await;
                let now = Instant::now();

                while admissions
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    admissions.pop_front();
                }

                if admissions.len() < self.budget {
                    admissions.push_back(now);
                    return;
                }

                let Some(oldest) = admissions.front().copied() else {
                    continue;
                };
                (oldest + self.window).saturating_duration_since(now)
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate budget reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of admissions currently inside the window.
    pub async fn in_flight_window(&self) -> usize {
        let mut admissions = self.admissions.lock().await;
        let now = Instant::now();
        while admissions
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            admissions.pop_front();
        }
        admissions.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
