//! Per-endpoint rate-limit governor.
//!
//! Sliding-window admission: an endpoint with quota `(N, W)` admits at most
//! `N` requests whose timestamps fall within the trailing `W` seconds. The
//! critical section is prune-then-check-then-append, done under one lock
//! acquisition per endpoint so unrelated endpoints never contend.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::timeout as tokio_timeout;

/// A quota for one upstream endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub requests_allowed: u32,
    pub window: Duration,
    pub is_limited: bool,
}

impl Quota {
    pub const fn limited(requests_allowed: u32, window_secs: u64) -> Self {
        Self {
            requests_allowed,
            window: Duration::from_secs(window_secs),
            is_limited: true,
        }
    }

    pub const fn unlimited() -> Self {
        Self {
            requests_allowed: 0,
            window: Duration::from_secs(0),
            is_limited: false,
        }
    }
}

/// Conservative default applied to endpoints the caller never registered a
/// quota for.
pub const DEFAULT_QUOTA: Quota = Quota::limited(30, 60);

/// A small buffer added on top of the computed wait so the retry does not
/// race the exact expiry instant.
const WAIT_BUFFER: Duration = Duration::from_millis(15);

#[derive(Default)]
struct EndpointState {
    timestamps: VecDeque<Instant>,
}

/// Snapshot returned by [`Governor::status`]; carries no side effects.
#[derive(Debug, Clone)]
pub struct GovernorStatus {
    pub limit: u32,
    pub current_in_window: usize,
    pub remaining: u32,
    pub earliest_release_time: Option<Instant>,
}

/// Error raised when a caller's deadline expires while waiting for admission.
#[derive(Debug, thiserror::Error)]
#[error("admission wait exceeded deadline for endpoint {endpoint}")]
pub struct DeadlineExceeded {
    pub endpoint: String,
}

/// The rate-limit governor. One instance is shared (behind an `Arc`) across
/// the whole process; it owns the quota table and the per-endpoint admission
/// log.
pub struct Governor {
    quotas: DashMap<String, Quota>,
    state: DashMap<String, Arc<Mutex<EndpointState>>>,
}

impl Governor {
    pub fn new() -> Self {
        Self {
            quotas: DashMap::new(),
            state: DashMap::new(),
        }
    }

    /// Register a quota for an endpoint. Call during startup for every
    /// upstream operation the gateway talks to.
    pub fn set_quota(&self, endpoint: impl Into<String>, quota: Quota) {
        self.quotas.insert(endpoint.into(), quota);
    }

    fn quota_for(&self, endpoint: &str) -> Quota {
        self.quotas
            .get(endpoint)
            .map(|q| *q)
            .unwrap_or(DEFAULT_QUOTA)
    }

    fn entry_for(&self, endpoint: &str) -> Arc<Mutex<EndpointState>> {
        self.state
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(EndpointState::default())))
            .clone()
    }

    /// Block until admission is legal for `endpoint`, or until `deadline`
    /// elapses. Admission is recorded atomically with the check.
    pub async fn admit(&self, endpoint: &str, deadline: Option<Duration>) -> Result<(), DeadlineExceeded> {
        let fut = self.admit_unbounded(endpoint);
        match deadline {
            None => {
                fut.await;
                Ok(())
            }
            Some(d) => tokio_timeout(d, fut).await.map_err(|_| DeadlineExceeded {
                endpoint: endpoint.to_string(),
            }),
        }
    }

    async fn admit_unbounded(&self, endpoint: &str) {
        let quota = self.quota_for(endpoint);
        if !quota.is_limited {
            return;
        }
        let entry = self.entry_for(endpoint);
        loop {
            let wait = {
                let mut state = entry.lock();
                let now = Instant::now();
                prune(&mut state.timestamps, now, quota.window);
                if state.timestamps.len() < quota.requests_allowed as usize {
                    state.timestamps.push_back(now);
                    None
                } else {
                    let oldest = *state.timestamps.front().expect("non-empty after prune check");
                    Some((oldest + quota.window).saturating_duration_since(now) + WAIT_BUFFER)
                }
            };
            match wait {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Inspect an endpoint's current admission state without mutating it.
    pub fn status(&self, endpoint: &str) -> GovernorStatus {
        let quota = self.quota_for(endpoint);
        if !quota.is_limited {
            return GovernorStatus {
                limit: 0,
                current_in_window: 0,
                remaining: u32::MAX,
                earliest_release_time: None,
            };
        }
        let entry = self.entry_for(endpoint);
        let mut state = entry.lock();
        let now = Instant::now();
        prune(&mut state.timestamps, now, quota.window);
        let current = state.timestamps.len();
        let remaining = quota.requests_allowed.saturating_sub(current as u32);
        let earliest_release_time = state.timestamps.front().map(|t| *t + quota.window);
        GovernorStatus {
            limit: quota.requests_allowed,
            current_in_window: current,
            remaining,
            earliest_release_time,
        }
    }

    /// Drop endpoints whose window has been empty for longer than the window
    /// itself. Best-effort background hygiene; correctness does not
    /// depend on this running.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.state.retain(|endpoint, entry| {
            let window = self.quota_for(endpoint).window;
            let mut state = entry.lock();
            prune(&mut state.timestamps, now, window);
            !state.timestamps.is_empty()
        });
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn admits_up_to_quota_without_waiting() {
        let gov = Governor::new();
        gov.set_quota("/e", Quota::limited(3, 60));
        let start = Instant::now();
        for _ in 0..3 {
            gov.admit("/e", None).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(200));
        let status = gov.status("/e");
        assert_eq!(status.current_in_window, 3);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn unlimited_endpoint_never_blocks() {
        let gov = Governor::new();
        gov.set_quota("/free", Quota::unlimited());
        for _ in 0..1000 {
            gov.admit("/free", None).await.unwrap();
        }
        assert_eq!(gov.status("/free").remaining, u32::MAX);
    }

    #[tokio::test]
    async fn unregistered_endpoint_uses_conservative_default() {
        let gov = Governor::new();
        let status = gov.status("/unseen");
        assert_eq!(status.limit, DEFAULT_QUOTA.requests_allowed);
    }

    #[tokio::test]
    async fn deadline_aborts_a_long_wait() {
        let gov = Governor::new();
        gov.set_quota("/tight", Quota::limited(1, 60));
        gov.admit("/tight", None).await.unwrap();
        let result = gov.admit("/tight", Some(Duration::from_millis(20))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_callers_never_exceed_quota_in_window() {
        let gov = Arc::new(Governor::new());
        gov.set_quota("/race", Quota::limited(10, 60));
        let admitted = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let gov = gov.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                gov.admit("/race", None).await.unwrap();
                admitted.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 10);
        assert_eq!(gov.status("/race").current_in_window, 10);
    }
}
