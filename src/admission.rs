//! Admission control — concurrency semaphore plus sliding-window rate limit.
//!
//! `acquire()` waits for a concurrency slot first, then for rate-window
//! capacity, so a caller can be delayed twice under contention. There is
//! no built-in acquire timeout; callers that need one compose
//! `tokio::time::timeout` around the call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Width of the rolling rate window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Holds one concurrency slot. Dropping the permit releases the slot;
/// release happens exactly once on every exit path.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Read-only admission snapshot for observability.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStatus {
    pub available_slots: usize,
    pub max_concurrent: usize,
    pub requests_last_minute: usize,
    pub requests_per_minute_limit: usize,
    pub queue_utilization: f64,
}

/// Bounds concurrent expensive work and admission rate.
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    requests_per_minute: usize,
    /// Admission timestamps within the rolling window, oldest first.
    window: Mutex<VecDeque<Instant>>,
}

impl AdmissionController {
    pub fn new(max_concurrent: usize, requests_per_minute: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            requests_per_minute,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a concurrency slot and rate-window capacity, then admit.
    ///
    /// Never errors; under sustained overload this waits indefinitely.
    pub async fn acquire(&self) -> AdmissionPermit {
        // The semaphore is never closed; it lives as long as self.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("admission semaphore closed");

        // Re-check after each sleep: another waiter may have taken the
        // slot that opened up, and the bound must hold regardless.
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= RATE_WINDOW)
                {
                    window.pop_front();
                }

                if window.len() < self.requests_per_minute {
                    window.push_back(now);
                    None
                } else {
                    // A zero limit admits nothing; otherwise wait for the
                    // oldest admission to leave the window.
                    Some(match window.front() {
                        Some(oldest) => RATE_WINDOW - now.duration_since(*oldest),
                        None => RATE_WINDOW,
                    })
                }
            };

            match wait {
                None => break,
                Some(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, "Rate window full, waiting");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        AdmissionPermit { _permit: permit }
    }

    /// Current admission state. Read-only; does not prune the window.
    pub async fn status(&self) -> AdmissionStatus {
        let available_slots = self.semaphore.available_permits();
        let now = Instant::now();
        let requests_last_minute = self
            .window
            .lock()
            .await
            .iter()
            .filter(|t| now.duration_since(**t) < RATE_WINDOW)
            .count();

        AdmissionStatus {
            available_slots,
            max_concurrent: self.max_concurrent,
            requests_last_minute,
            requests_per_minute_limit: self.requests_per_minute,
            queue_utilization: (self.max_concurrent - available_slots) as f64
                / self.max_concurrent.max(1) as f64,
        }
    }
}
