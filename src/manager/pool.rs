//! Warm pool of pre-started sandboxes with FIFO lease semantics (§4.3.1,
//! §5). Idle members wait in a `VecDeque` (oldest-idle-first); leased
//! members move to a `busy` set so the janitor can tell pool membership from
//! ad-hoc sandboxes without it tracking lease state itself.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::error::{EnclaveError, EnclaveResult};
use crate::sandbox::Sandbox;

/// Pool of sandboxes of a single kind/config, leased out in FIFO order.
///
/// `idle` and `busy` are guarded by one mutex so a lease and a release can't
/// interleave into a state where a sandbox is in both or neither.
pub struct SandboxPool {
    state: Mutex<PoolState>,
    available: Notify,
}

struct PoolState {
    idle: VecDeque<Arc<dyn Sandbox>>,
    busy: HashSet<String>,
}

impl SandboxPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                busy: HashSet::new(),
            }),
            available: Notify::new(),
        }
    }

    /// Adds a started sandbox to the idle end of the queue.
    pub async fn add_idle(&self, sandbox: Arc<dyn Sandbox>) {
        self.state.lock().await.idle.push_back(sandbox);
        self.available.notify_one();
    }

    /// Leases the oldest idle sandbox, waiting up to `timeout` for one to
    /// become available. Returns `EnclaveError::Timeout` on deadline expiry
    /// (§4.3.1 step 1, §8): the pool isn't capacity-bounded, it's just empty
    /// right now, so the caller gets a timeout rather than an exhaustion error.
    pub async fn lease(&self, timeout: std::time::Duration) -> EnclaveResult<Arc<dyn Sandbox>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(sandbox) = state.idle.pop_front() {
                    state.busy.insert(sandbox.id().to_string());
                    return Ok(sandbox);
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(EnclaveError::Timeout(
                    "no idle sandbox became available before the lease timeout".to_string(),
                ));
            }
            let _ = tokio::time::timeout(remaining, self.available.notified()).await;
        }
    }

    /// Returns a leased sandbox to the idle queue.
    pub async fn release(&self, sandbox: Arc<dyn Sandbox>) {
        let mut state = self.state.lock().await;
        state.busy.remove(sandbox.id());
        state.idle.push_back(sandbox);
        drop(state);
        self.available.notify_one();
    }

    /// True if `id` is a lease-out member of this pool (busy or idle).
    pub async fn contains(&self, id: &str) -> bool {
        let state = self.state.lock().await;
        state.busy.contains(id) || state.idle.iter().any(|s| s.id() == id)
    }

    pub async fn is_busy(&self, id: &str) -> bool {
        self.state.lock().await.busy.contains(id)
    }

    pub async fn idle_len(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    pub async fn busy_len(&self) -> usize {
        self.state.lock().await.busy.len()
    }

    /// Drops `id` from pool membership (idle or busy) without returning the
    /// sandbox handle. Used by `delete_sandbox`, which tears the sandbox
    /// down itself — the pool only needs to stop accounting for it.
    pub async fn remove(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let was_busy = state.busy.remove(id);
        let before = state.idle.len();
        state.idle.retain(|s| s.id() != id);
        was_busy || state.idle.len() != before
    }

    /// Drops a known-dead leased member from the busy set only, without
    /// touching idle (it was never returned there). Used by
    /// `execute_tool_in_pool`'s replacement path.
    pub async fn forget_busy(&self, id: &str) {
        self.state.lock().await.busy.remove(id);
    }

    /// Drains every member (idle and busy) for a full pool teardown.
    pub async fn drain_all(&self) -> Vec<Arc<dyn Sandbox>> {
        let mut state = self.state.lock().await;
        state.busy.clear();
        state.idle.drain(..).collect()
    }
}

impl Default for SandboxPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::{AnySandboxConfig, SandboxConfig};
    use crate::sandbox::dummy::DummySandbox;

    fn dummy() -> Arc<dyn Sandbox> {
        Arc::new(DummySandbox::new(
            AnySandboxConfig::Dummy(SandboxConfig::default()),
            None,
        ))
    }

    #[tokio::test]
    async fn lease_then_release_round_trips() {
        let pool = SandboxPool::new();
        let sandbox = dummy();
        let id = sandbox.id().to_string();
        pool.add_idle(sandbox).await;

        let leased = pool.lease(std::time::Duration::from_secs(1)).await.unwrap();
        assert_eq!(leased.id(), id);
        assert_eq!(pool.idle_len().await, 0);
        assert_eq!(pool.busy_len().await, 1);

        pool.release(leased).await;
        assert_eq!(pool.idle_len().await, 1);
        assert_eq!(pool.busy_len().await, 0);
    }

    #[tokio::test]
    async fn lease_times_out_when_empty() {
        let pool = SandboxPool::new();
        let result = pool.lease(std::time::Duration::from_millis(10)).await;
        assert!(matches!(result, Err(EnclaveError::Timeout(_))));
    }

    #[tokio::test]
    async fn lease_wakes_on_release() {
        let pool = Arc::new(SandboxPool::new());
        let sandbox = dummy();
        pool.add_idle(sandbox).await;
        let first = pool.lease(std::time::Duration::from_secs(1)).await.unwrap();

        let waiter_pool = pool.clone();
        let waiter = tokio::spawn(async move {
            waiter_pool
                .lease(std::time::Duration::from_secs(1))
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        pool.release(first).await;

        let leased = waiter.await.unwrap().unwrap();
        assert_eq!(leased.id(), leased.id());
    }
}
