//! In-process gateway for tests
//!
//! Routes gateway calls to [`EventService`]s registered under a host URI,
//! the way HTTP would route them to other daemons. Calls to unregistered
//! hosts fail with a transport error; individual calls can be made to fail
//! per target with [`InProcessGateway::fail`].

use crate::error::{EventError, EventResult, GatewayError, GatewayResult};
use crate::gateway::EventGateway;
use crate::service::EventService;
use crate::settings::NodeSettings;
use crate::storage::InMemoryStorage;
use async_trait::async_trait;
use dcr_types::{EventAddressDto, EventDefinition, EventKey, LockDto, Relation};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// The gateway operations, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    IsExecuted,
    IsIncluded,
    Lock,
    Unlock,
    SendPending,
    SendIncluded,
}

/// [`EventGateway`] that dispatches to in-process services
#[derive(Default)]
pub struct InProcessGateway {
    hosts: RwLock<HashMap<String, Arc<EventService>>>,
    faults: Mutex<HashSet<(EventKey, GatewayCall)>>,
    calls: Mutex<Vec<(EventKey, GatewayCall)>>,
    latency: Mutex<Duration>,
}

impl InProcessGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `service` under `uri`
    pub fn register(&self, uri: impl Into<String>, service: Arc<EventService>) {
        self.hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), service);
    }

    /// Delay every call by `latency` before dispatching it
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Start a host at `uri` backed by in-memory storage and seed it
    pub async fn spawn_host(
        self: &Arc<Self>,
        uri: &str,
        lock_wait_timeout: Duration,
        definitions: Vec<EventDefinition>,
    ) -> EventResult<Arc<EventService>> {
        let service = Arc::new(EventService::new(
            Arc::new(InMemoryStorage::new()),
            self.clone(),
            NodeSettings::new(uri).with_lock_wait_timeout(lock_wait_timeout),
        ));
        for definition in definitions {
            service.create_event(definition).await?;
        }
        self.register(uri, service.clone());
        Ok(service)
    }

    /// Make every `call` against `target` fail with a 503
    pub fn fail(&self, target: EventKey, call: GatewayCall) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((target, call));
    }

    /// Stop failing `call` against `target`
    pub fn heal(&self, target: &EventKey, call: GatewayCall) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(target.clone(), call));
    }

    /// Number of `call`s issued so far, failed ones included
    pub fn count(&self, call: GatewayCall) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, c)| *c == call)
            .count()
    }

    /// Number of `call`s issued against `target`
    pub fn count_for(&self, target: &EventKey, call: GatewayCall) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, c)| k == target && *c == call)
            .count()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Record the call and resolve the service hosting `target`
    fn route(&self, target: &Relation, call: GatewayCall) -> GatewayResult<Arc<EventService>> {
        let key = target.target_key();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.clone(), call));

        if self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(key, call))
        {
            return Err(GatewayError::Status {
                status: 503,
                message: format!("injected {:?} failure", call),
            });
        }

        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target.target_uri)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Transport(format!("host {} unreachable", target.target_uri))
            })
    }
}

fn remote(err: EventError) -> GatewayError {
    GatewayError::Status {
        status: err.http_status(),
        message: err.to_string(),
    }
}

#[async_trait]
impl EventGateway for InProcessGateway {
    async fn is_executed(&self, target: &Relation, caller_id: &str) -> GatewayResult<bool> {
        self.delay().await;
        let service = self.route(target, GatewayCall::IsExecuted)?;
        service
            .is_executed(&target.target_key(), caller_id)
            .await
            .map_err(remote)
    }

    async fn is_included(&self, target: &Relation, caller_id: &str) -> GatewayResult<bool> {
        self.delay().await;
        let service = self.route(target, GatewayCall::IsIncluded)?;
        service
            .is_included(&target.target_key(), caller_id)
            .await
            .map_err(remote)
    }

    async fn lock(&self, target: &Relation, lock: &LockDto) -> GatewayResult<()> {
        self.delay().await;
        let service = self.route(target, GatewayCall::Lock)?;
        service
            .locks()
            .lock_self(&target.target_key(), &lock.lock_owner)
            .await
            .map_err(remote)
    }

    async fn unlock(&self, target: &Relation, caller_id: &str) -> GatewayResult<()> {
        self.delay().await;
        let service = self.route(target, GatewayCall::Unlock)?;
        service
            .locks()
            .unlock_self(&target.target_key(), caller_id)
            .await
            .map_err(remote)
    }

    async fn send_pending(&self, target: &Relation, caller: &EventAddressDto) -> GatewayResult<()> {
        self.delay().await;
        let service = self.route(target, GatewayCall::SendPending)?;
        service
            .set_pending(&target.target_key(), &caller.owner_id(), true)
            .await
            .map_err(remote)
    }

    async fn send_included(
        &self,
        target: &Relation,
        caller: &EventAddressDto,
        value: bool,
    ) -> GatewayResult<()> {
        self.delay().await;
        let service = self.route(target, GatewayCall::SendIncluded)?;
        service
            .set_included(&target.target_key(), &caller.owner_id(), value)
            .await
            .map_err(remote)
    }
}
