//! Distributed locking protocol
//!
//! Every node owns one lock marker. A node about to execute first locks
//! itself, then every node reachable through its Response, Inclusion and
//! Exclusion relations. Locking is best-effort and compensated: if any
//! dependent refuses or is unreachable, every dependent that *was* locked
//! is unlocked again and the attempt reports failure. There is no
//! two-phase commit; each node's own marker is the authoritative gate.
//!
//! Locally, check-then-act on a node's record is serialized through a
//! per-record async mutex, and waiters for a foreign lock are woken when
//! the marker is cleared.

use crate::error::{EventError, EventResult};
use crate::gateway::EventGateway;
use crate::storage::Storage;
use dashmap::DashMap;
use dcr_types::{EventKey, LockDto, Relation};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

/// Per-record serialization and release notification
#[derive(Debug, Default)]
struct RecordSlot {
    mutex: Arc<Mutex<()>>,
    released: Notify,
    /// Held for the whole of one `execute`
    executing: Arc<Mutex<()>>,
}

/// Lock marker management for the nodes hosted by one process
pub struct LockManager {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn EventGateway>,
    slots: DashMap<EventKey, Arc<RecordSlot>>,
    wait_timeout: Duration,
}

impl LockManager {
    /// Create a lock manager over the given store and gateway
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn EventGateway>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            gateway,
            slots: DashMap::new(),
            wait_timeout,
        }
    }

    fn slot(&self, key: &EventKey) -> Arc<RecordSlot> {
        self.slots.entry(key.clone()).or_default().clone()
    }

    /// Slots are only created for stored nodes
    async fn existing_slot(&self, key: &EventKey) -> EventResult<Arc<RecordSlot>> {
        if !self.storage.exists(key).await? {
            return Err(EventError::NotFound(format!("Event {} not found", key)));
        }
        Ok(self.slot(key))
    }

    fn notify_released(&self, key: &EventKey) {
        if let Some(slot) = self.slots.get(key) {
            slot.released.notify_waiters();
        }
    }

    /// Serialize access to the record of a node known to exist
    pub async fn guard(&self, key: &EventKey) -> OwnedMutexGuard<()> {
        self.slot(key).mutex.clone().lock_owned().await
    }

    /// Claim the right to execute the node; fails with `Conflict` while
    /// another execution of it is in progress.
    pub async fn begin_execution(&self, key: &EventKey) -> EventResult<OwnedMutexGuard<()>> {
        let slot = self.existing_slot(key).await?;
        slot.executing.clone().try_lock_owned().map_err(|_| {
            EventError::Conflict(format!("Event {} is already being executed", key))
        })
    }

    /// True if no lock marker exists or `caller_id` owns it. Pure read.
    pub async fn is_allowed_to_operate(&self, key: &EventKey, caller_id: &str) -> EventResult<bool> {
        validate(key, caller_id)?;
        let owner = self.storage.get_lock_owner(key).await?;
        Ok(owner.map_or(true, |owner| owner == caller_id))
    }

    /// Take the record guard if `caller_id` may operate, fail fast otherwise
    pub async fn try_turn(&self, key: &EventKey, caller_id: &str) -> EventResult<OwnedMutexGuard<()>> {
        validate(key, caller_id)?;
        let guard = self.existing_slot(key).await?.mutex.clone().lock_owned().await;
        if self.is_allowed_to_operate(key, caller_id).await? {
            Ok(guard)
        } else {
            Err(locked_by_other(key))
        }
    }

    /// Take the record guard once `caller_id` may operate.
    ///
    /// Waits for the current holder to release, up to the configured
    /// timeout, then fails with `Conflict`.
    pub async fn wait_for_turn(&self, key: &EventKey, caller_id: &str) -> EventResult<OwnedMutexGuard<()>> {
        validate(key, caller_id)?;
        let slot = self.existing_slot(key).await?;
        let deadline = tokio::time::Instant::now() + self.wait_timeout;

        loop {
            // Register before checking so a release in between is not lost
            let released = slot.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let guard = slot.mutex.clone().lock_owned().await;
            if self.is_allowed_to_operate(key, caller_id).await? {
                return Ok(guard);
            }
            drop(guard);

            debug!(event = %key, caller = %caller_id, "Waiting for lock release");
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                warn!(event = %key, caller = %caller_id, "Timed out waiting for lock release");
                return Err(locked_by_other(key));
            }
        }
    }

    /// Set the lock marker to `caller_id`; re-locking by the owner succeeds
    pub async fn lock_self(&self, key: &EventKey, caller_id: &str) -> EventResult<()> {
        let _guard = self.try_turn(key, caller_id).await?;
        self.storage.set_lock_owner(key, caller_id).await?;
        debug!(event = %key, owner = %caller_id, "Locked");
        Ok(())
    }

    /// Clear the lock marker if `caller_id` may operate
    pub async fn unlock_self(&self, key: &EventKey, caller_id: &str) -> EventResult<()> {
        let guard = self.try_turn(key, caller_id).await?;
        self.storage.clear_lock(key).await?;
        drop(guard);
        self.notify_released(key);
        debug!(event = %key, caller = %caller_id, "Unlocked");
        Ok(())
    }

    /// Clear the lock marker regardless of owner
    pub async fn force_unlock(&self, key: &EventKey) -> EventResult<()> {
        let guard = self.existing_slot(key).await?.mutex.clone().lock_owned().await;
        let previous = self.storage.get_lock_owner(key).await?;
        self.storage.clear_lock(key).await?;
        drop(guard);
        self.notify_released(key);
        if let Some(owner) = previous {
            warn!(event = %key, %owner, "Lock forcibly cleared");
        }
        Ok(())
    }

    /// Forget the bookkeeping of a deleted node
    pub fn forget(&self, key: &EventKey) {
        if let Some((_, slot)) = self.slots.remove(key) {
            slot.released.notify_waiters();
        }
    }

    /// Lock this node to itself, then every dependent.
    ///
    /// Returns `Ok(false)` if some dependent could not be locked; in that
    /// case the dependents that were locked, and this node, are released
    /// again before returning.
    #[instrument(skip(self, key), fields(event = %key))]
    pub async fn lock_all(&self, key: &EventKey) -> EventResult<bool> {
        let owner = key.owner_id();
        let owner = owner.as_str();
        self.lock_self(key, owner).await?;

        let dependents = match self.dependents(key).await {
            Ok(dependents) => dependents,
            Err(err) => {
                self.release_own(key).await;
                return Err(err);
            }
        };

        let attempts = join_all(dependents.iter().map(|target| async move {
            let lock = LockDto::new(owner, &target.target_workflow_id, &target.target_event_id);
            (target, self.gateway.lock(target, &lock).await)
        }))
        .await;

        let mut locked = Vec::with_capacity(dependents.len());
        for (target, result) in attempts {
            match result {
                Ok(()) => locked.push(target),
                Err(err) => warn!(%target, error = %err, "Failed to lock dependent"),
            }
        }

        if locked.len() < dependents.len() {
            warn!(
                locked = locked.len(),
                required = dependents.len(),
                "Rolling back partial lock"
            );
            self.rollback(owner, &locked).await;
            self.release_own(key).await;
            return Ok(false);
        }

        info!(dependents = dependents.len(), "Locked all dependents");
        Ok(true)
    }

    /// Unlock every dependent; true only if every one was unlocked.
    ///
    /// The node's own marker is left to the caller.
    #[instrument(skip(self, key), fields(event = %key))]
    pub async fn unlock_all(&self, key: &EventKey) -> EventResult<bool> {
        let owner = key.owner_id();
        let owner = owner.as_str();
        let dependents = self.dependents(key).await?;

        let results = join_all(
            dependents
                .iter()
                .map(|target| async move { (target, self.gateway.unlock(target, owner).await) }),
        )
        .await;

        let mut failed = 0;
        for (target, result) in results {
            if let Err(err) = result {
                failed += 1;
                error!(%target, error = %err, "Failed to unlock dependent");
            }
        }

        if failed == 0 {
            info!(dependents = dependents.len(), "Unlocked all dependents");
        }
        Ok(failed == 0)
    }

    /// Response ∪ Inclusion ∪ Exclusion without this node itself
    async fn dependents(&self, key: &EventKey) -> EventResult<Vec<Relation>> {
        let relations = self.storage.get_relation_set(key).await?;
        Ok(relations
            .dependents()
            .into_iter()
            .filter(|target| !target.targets(key))
            .collect())
    }

    async fn rollback(&self, owner: &str, locked: &[&Relation]) {
        let results = join_all(
            locked
                .iter()
                .map(|target| async move { (*target, self.gateway.unlock(target, owner).await) }),
        )
        .await;

        for (target, result) in results {
            if let Err(err) = result {
                error!(%target, error = %err, "Compensating unlock failed");
            }
        }
    }

    async fn release_own(&self, key: &EventKey) {
        if let Err(err) = self.unlock_self(key, &key.owner_id()).await {
            error!(event = %key, error = %err, "Failed to release own lock");
        }
    }
}

fn validate(key: &EventKey, caller_id: &str) -> EventResult<()> {
    if key.is_blank() || caller_id.trim().is_empty() {
        return Err(EventError::Argument(
            "workflow id, event id and caller id must be non-empty".to_string(),
        ));
    }
    Ok(())
}

fn locked_by_other(key: &EventKey) -> EventError {
    EventError::Conflict(format!("Event {} is locked by someone else", key))
}
