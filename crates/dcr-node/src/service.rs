//! Event node state machine
//!
//! [`EventService`] is the lifecycle-facing surface of the nodes hosted by
//! one process: read accessors, the strict pushes neighbors use to update
//! us, the `execute` transition and node administration.
//!
//! Execute runs, in order: existence check, role check, own-lock check,
//! executability, `lock_all`, propagation plus local commit, `unlock_all`.
//! Once `lock_all` has succeeded, `unlock_all` is always attempted exactly
//! once; an unlock failure outranks any earlier propagation failure.

use crate::auth::RoleAuthorizer;
use crate::error::{EventError, EventResult, GatewayResult, StorageResult};
use crate::gateway::EventGateway;
use crate::lock::LockManager;
use crate::settings::NodeSettings;
use crate::storage::Storage;
use dcr_types::{
    EventAddressDto, EventDefinition, EventKey, EventState, EventStateDto, EventSummary, Relation,
    RoleDto,
};
use futures::future::{join_all, try_join};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A state change pushed to a related node after executing
#[derive(Debug, Clone, Copy)]
enum Push {
    Pending,
    Included(bool),
}

/// Hosts event nodes and runs their protocol
pub struct EventService {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn EventGateway>,
    locks: LockManager,
    authorizer: RoleAuthorizer,
    settings: NodeSettings,
}

impl EventService {
    /// Service over `storage`, reaching other hosts through `gateway`
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn EventGateway>,
        settings: NodeSettings,
    ) -> Self {
        Self {
            locks: LockManager::new(storage.clone(), gateway.clone(), settings.lock_wait_timeout),
            authorizer: RoleAuthorizer::new(storage.clone()),
            storage,
            gateway,
            settings,
        }
    }

    /// Lock protocol of the hosted nodes
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Host settings this service runs with
    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    async fn ensure_exists(&self, key: &EventKey) -> EventResult<()> {
        if key.is_blank() {
            return Err(EventError::Argument(
                "workflow id and event id must be non-empty".to_string(),
            ));
        }
        if !self.storage.exists(key).await? {
            return Err(EventError::NotFound(format!("Event {} not found", key)));
        }
        Ok(())
    }

    // ========== Read accessors ==========

    /// Waits for a foreign lock holder to release, bounded by the
    /// configured wait timeout.
    pub async fn is_executed(&self, key: &EventKey, sender_id: &str) -> EventResult<bool> {
        require_sender(sender_id)?;
        self.ensure_exists(key).await?;
        let _turn = self.locks.wait_for_turn(key, sender_id).await?;
        Ok(self.storage.get_executed(key).await?)
    }

    /// Waits like [`EventService::is_executed`]
    pub async fn is_included(&self, key: &EventKey, sender_id: &str) -> EventResult<bool> {
        require_sender(sender_id)?;
        self.ensure_exists(key).await?;
        let _turn = self.locks.wait_for_turn(key, sender_id).await?;
        Ok(self.storage.get_included(key).await?)
    }

    /// Full state view, with `executable` evaluated against the
    /// Condition targets at call time.
    pub async fn get_state(&self, key: &EventKey, sender_id: &str) -> EventResult<EventStateDto> {
        require_sender(sender_id)?;
        self.ensure_exists(key).await?;

        let (name, state) = {
            let _turn = self.locks.wait_for_turn(key, sender_id).await?;
            (
                self.storage.get_name(key).await?,
                self.storage.get_state(key).await?,
            )
        };
        let executable = self.is_executable(key).await?;

        Ok(EventStateDto {
            id: key.event_id.clone(),
            name,
            executed: state.executed,
            included: state.included,
            pending: state.pending,
            executable,
        })
    }

    /// Included, and every Condition target is excluded or executed.
    ///
    /// A Condition target that cannot be queried counts as unsatisfied.
    pub async fn is_executable(&self, key: &EventKey) -> EventResult<bool> {
        if !self.storage.get_included(key).await? {
            return Ok(false);
        }

        let conditions = self.storage.get_conditions(key).await?;
        let caller = key.owner_id();
        let caller = caller.as_str();

        let results = join_all(conditions.iter().map(|condition| async move {
            let outcome = try_join(
                self.gateway.is_executed(condition, caller),
                self.gateway.is_included(condition, caller),
            )
            .await;
            (condition, outcome)
        }))
        .await;

        let mut executable = true;
        for (condition, outcome) in results {
            match outcome {
                Ok((executed, included)) => {
                    if included && !executed {
                        debug!(event = %key, %condition, "Condition not satisfied");
                        executable = false;
                    }
                }
                Err(err) => {
                    warn!(event = %key, %condition, error = %err, "Could not evaluate condition");
                    executable = false;
                }
            }
        }

        Ok(executable)
    }

    // ========== Neighbor pushes ==========

    /// Strict: fails with `Conflict` unless `sender_id` may operate
    pub async fn set_included(&self, key: &EventKey, sender_id: &str, value: bool) -> EventResult<()> {
        require_sender(sender_id)?;
        self.ensure_exists(key).await?;
        let _turn = self.locks.try_turn(key, sender_id).await?;
        self.storage.set_included(key, value).await?;
        debug!(event = %key, sender = %sender_id, value, "Included updated");
        Ok(())
    }

    /// Strict: fails with `Conflict` unless `sender_id` may operate
    pub async fn set_pending(&self, key: &EventKey, sender_id: &str, value: bool) -> EventResult<()> {
        require_sender(sender_id)?;
        self.ensure_exists(key).await?;
        let _turn = self.locks.try_turn(key, sender_id).await?;
        self.storage.set_pending(key, value).await?;
        debug!(event = %key, sender = %sender_id, value, "Pending updated");
        Ok(())
    }

    // ========== Execution ==========

    /// Execute the event on behalf of a caller holding `roles`.
    #[instrument(skip(self, key, roles), fields(event = %key, execution_id = %Uuid::new_v4()))]
    pub async fn execute(&self, key: &EventKey, roles: Option<&RoleDto>) -> EventResult<bool> {
        self.ensure_exists(key).await?;

        if !self.authorizer.is_authorized(key, roles).await? {
            return Err(EventError::Unauthorized(format!(
                "caller roles do not permit executing {}",
                key
            )));
        }

        // One execution of this node at a time, held until unlocked again
        let _execution = self.locks.begin_execution(key).await?;
        let owner = key.owner_id();

        // Must not be locked by anyone else
        drop(self.locks.wait_for_turn(key, &owner).await?);

        if !self.is_executable(key).await? {
            return Err(EventError::NotExecutable(format!(
                "Event {} is excluded or has unmet conditions",
                key
            )));
        }

        if !self.locks.lock_all(key).await? {
            return Err(EventError::FailedToLockOtherEvent(format!(
                "could not lock every event related to {}",
                key
            )));
        }

        let outcome = self.propagate_and_commit(key).await;

        let unlocked = self.locks.unlock_all(key).await;
        if let Err(err) = self.locks.unlock_self(key, &owner).await {
            error!(error = %err, "Failed to release own lock");
        }

        match unlocked {
            Ok(true) => {}
            Ok(false) => {
                return Err(EventError::FailedToUnlockOtherEvent(format!(
                    "some events related to {} remain locked",
                    key
                )))
            }
            Err(err) => return Err(EventError::FailedToUnlockOtherEvent(err.to_string())),
        }

        outcome?;
        info!("Event executed");
        Ok(true)
    }

    /// Push Pending/Included/Excluded to every related node, then commit
    /// the local transition. The local commit is attempted even if a push
    /// failed; the first failure is returned afterwards.
    async fn propagate_and_commit(&self, key: &EventKey) -> EventResult<()> {
        let relations = self
            .storage
            .get_relation_set(key)
            .await
            .map_err(|e| EventError::FailedToUpdateState(e.to_string()))?;
        let caller = EventAddressDto::new(
            key.workflow_id.as_str(),
            key.event_id.as_str(),
            self.settings.public_uri.as_str(),
        );

        // Pushes to one target run in order; targets run concurrently
        let mut pushes: BTreeMap<&Relation, Vec<Push>> = BTreeMap::new();
        for target in &relations.responses {
            pushes.entry(target).or_default().push(Push::Pending);
        }
        for target in &relations.inclusions {
            pushes.entry(target).or_default().push(Push::Included(true));
        }
        for target in &relations.exclusions {
            pushes.entry(target).or_default().push(Push::Included(false));
        }

        let caller = &caller;
        let results = join_all(pushes.into_iter().map(|(target, pushes)| async move {
            for push in pushes {
                self.push(target, caller, push).await?;
            }
            GatewayResult::Ok(())
        }))
        .await;

        let mut remote_failure = None;
        for result in results {
            if let Err(err) = result {
                warn!(event = %key, error = %err, "Propagation failed");
                remote_failure.get_or_insert(EventError::FailedToUpdateStateAtOtherEvent(
                    err.to_string(),
                ));
            }
        }

        let committed = self
            .commit_execution(key)
            .await
            .map_err(|e| EventError::FailedToUpdateState(e.to_string()))?;
        debug!(event = %key, state = ?committed, "Local state committed");

        match remote_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn push(&self, target: &Relation, caller: &EventAddressDto, push: Push) -> GatewayResult<()> {
        debug!(%target, ?push, "Propagating");
        match push {
            Push::Pending => self.gateway.send_pending(target, caller).await,
            Push::Included(value) => self.gateway.send_included(target, caller, value).await,
        }
    }

    /// Re-read the state, since neighbors (or our own propagation) may
    /// have pushed into it, and mark it executed.
    async fn commit_execution(&self, key: &EventKey) -> StorageResult<EventState> {
        let _guard = self.locks.guard(key).await;
        let next = self.storage.get_state(key).await?.after_execution();
        self.storage.set_executed(key, next.executed).await?;
        self.storage.set_pending(key, next.pending).await?;
        Ok(next)
    }

    // ========== Administration ==========

    /// Instantiate a node on this host
    pub async fn create_event(&self, definition: EventDefinition) -> EventResult<()> {
        definition
            .validate()
            .map_err(|e| EventError::Argument(e.to_string()))?;
        let key = definition.key();
        self.storage.create_event(definition).await?;
        info!(event = %key, "Event created");
        Ok(())
    }

    /// Remove a node; refused while anyone holds its lock
    pub async fn delete_event(&self, key: &EventKey) -> EventResult<()> {
        self.ensure_exists(key).await?;
        {
            let _guard = self.locks.guard(key).await;
            if let Some(owner) = self.storage.get_lock_owner(key).await? {
                return Err(EventError::Conflict(format!(
                    "Event {} is locked by {}",
                    key, owner
                )));
            }
            if !self.storage.delete_event(key).await? {
                return Err(EventError::NotFound(format!("Event {} not found", key)));
            }
        }
        self.locks.forget(key);
        info!(event = %key, "Event deleted");
        Ok(())
    }

    /// Restore the initial flags and force-clear the lock, whoever owns it
    pub async fn reset_event(&self, key: &EventKey) -> EventResult<()> {
        self.ensure_exists(key).await?;
        {
            let _guard = self.locks.guard(key).await;
            self.storage.reset_state(key).await?;
        }
        self.locks.force_unlock(key).await?;
        info!(event = %key, "Event reset");
        Ok(())
    }

    /// Nodes of `workflow_id` hosted here
    pub async fn list_events(&self, workflow_id: &str) -> EventResult<Vec<EventSummary>> {
        if workflow_id.trim().is_empty() {
            return Err(EventError::Argument("workflow id must be non-empty".to_string()));
        }
        Ok(self.storage.list_events(workflow_id).await?)
    }
}

fn require_sender(sender_id: &str) -> EventResult<()> {
    if sender_id.trim().is_empty() {
        return Err(EventError::Argument("sender id must be non-empty".to_string()));
    }
    Ok(())
}
