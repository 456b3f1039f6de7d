//! Sliding-window rate limiting
//!
//! A [`RateLimiter`] enforces several rolling windows at once (for example
//! per-second, per-minute and per-day ceilings). A request is admitted only
//! when every window has room for it, and its instant is then recorded in all
//! of them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::constants::{REQUESTS_PER_DAY, REQUESTS_PER_MINUTE, REQUESTS_PER_SECOND};
use crate::error::{InatError, Result};

/// One `(duration, max_requests)` ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub duration: Duration,
    pub max_requests: u32,
}

impl RateLimit {
    pub fn new(duration: Duration, max_requests: u32) -> Self {
        Self {
            duration,
            max_requests,
        }
    }

    pub fn per_second(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(1), max_requests)
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(60), max_requests)
    }

    pub fn per_day(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(86_400), max_requests)
    }

    /// The published iNaturalist guidance
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::per_second(REQUESTS_PER_SECOND),
            Self::per_minute(REQUESTS_PER_MINUTE),
            Self::per_day(REQUESTS_PER_DAY),
        ]
    }
}

/// Snapshot of a single window, for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOccupancy {
    pub duration: Duration,
    pub max_requests: u32,
    pub current: usize,
}

#[derive(Debug)]
struct Window {
    limit: RateLimit,
    timestamps: VecDeque<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.limit.duration {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_room(&self) -> bool {
        self.timestamps.len() < self.limit.max_requests as usize
    }

    /// Time until the oldest entry ages out (only meaningful when full)
    fn wait_for_slot(&self, now: Instant) -> Duration {
        self.timestamps
            .front()
            .map(|&oldest| (oldest + self.limit.duration).saturating_duration_since(now))
            .unwrap_or_default()
    }
}

/// Process-wide limiter shared by every call path.
///
/// Construct once and hand out clones of an `Arc<RateLimiter>`. All windows
/// sit behind a single lock, so the capacity check and the recording of a
/// new request are atomic even when many tasks admit concurrently.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<Vec<Window>>,
    max_delay: Option<Duration>,
}

impl RateLimiter {
    pub fn new(limits: Vec<RateLimit>) -> Result<Self> {
        for limit in &limits {
            if limit.duration.is_zero() || limit.max_requests == 0 {
                return Err(InatError::Validation(format!(
                    "Rate limit window must have a non-zero duration and capacity: {:?}",
                    limit
                )));
            }
        }

        let windows = limits
            .into_iter()
            .map(|limit| Window {
                limit,
                timestamps: VecDeque::with_capacity(limit.max_requests.min(1024) as usize),
            })
            .collect();

        Ok(Self {
            windows: Mutex::new(windows),
            max_delay: None,
        })
    }

    /// Fail admission instead of sleeping when the required wait exceeds `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to admit one request right now.
    ///
    /// Returns `None` if it was admitted, or the wait until every saturated
    /// window has a free slot.
    fn try_admit(&self, now: Instant) -> Option<Duration> {
        let mut windows = self.lock();
        for window in windows.iter_mut() {
            window.prune(now);
        }

        let wait = windows
            .iter()
            .filter(|w| !w.has_room())
            .map(|w| w.wait_for_slot(now))
            .max();

        if wait.is_none() {
            for window in windows.iter_mut() {
                window.timestamps.push_back(now);
            }
        }
        wait
    }

    /// Wait until all windows can accept one more request, then record it
    pub async fn admit(&self) -> Result<()> {
        loop {
            let Some(wait) = self.try_admit(Instant::now()) else {
                return Ok(());
            };

            if let Some(max) = self.max_delay {
                if wait > max {
                    return Err(InatError::AdmissionDelay {
                        required: wait,
                        max,
                    });
                }
            }

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Sustained requests per minute allowed by the windows of a minute or
    /// shorter; `None` if there are none
    pub fn requests_per_minute(&self) -> Option<u32> {
        let minute = Duration::from_secs(60);
        self.lock()
            .iter()
            .filter(|window| window.limit.duration <= minute)
            .map(|window| {
                let millis = window.limit.duration.as_millis().max(1);
                let rate = u128::from(window.limit.max_requests) * minute.as_millis() / millis;
                u32::try_from(rate).unwrap_or(u32::MAX)
            })
            .min()
    }

    /// Current number of requests counted in each window
    pub fn occupancy(&self) -> Vec<WindowOccupancy> {
        let now = Instant::now();
        let mut windows = self.lock();
        windows
            .iter_mut()
            .map(|window| {
                window.prune(now);
                WindowOccupancy {
                    duration: window.limit.duration,
                    max_requests: window.limit.max_requests,
                    current: window.timestamps.len(),
                }
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        let windows = RateLimit::defaults()
            .into_iter()
            .map(|limit| Window {
                limit,
                timestamps: VecDeque::new(),
            })
            .collect();
        Self {
            windows: Mutex::new(windows),
            max_delay: None,
        }
    }
}
