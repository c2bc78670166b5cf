//! End-to-end tests: event nodes spread over several hosts, talking
//! through the in-process gateway.

use dcr_node::testing::{GatewayCall, InProcessGateway};
use dcr_node::{EventError, EventService};
use dcr_types::{EventDefinition, EventKey, EventState, Relation, RelationKind, RelationSet, RoleDto};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const HOST_A: &str = "http://node-a:8080";
const HOST_B: &str = "http://node-b:8080";
const HOST_C: &str = "http://node-c:8080";
const WORKFLOW: &str = "exam";
const WAIT: Duration = Duration::from_millis(100);

fn key(event_id: &str) -> EventKey {
    EventKey::new(WORKFLOW, event_id)
}

fn on(host: &str, event_id: &str) -> Relation {
    Relation::new(WORKFLOW, event_id, host)
}

fn event(event_id: &str, state: EventState, relations: RelationSet) -> EventDefinition {
    EventDefinition {
        workflow_id: WORKFLOW.to_string(),
        event_id: event_id.to_string(),
        name: format!("Step {}", event_id),
        roles: vec!["Teacher".to_string()],
        initial_state: state,
        relations,
    }
}

fn included() -> EventState {
    EventState::new(false, true, false)
}

fn teacher() -> RoleDto {
    RoleDto::new(["Teacher"])
}

async fn unlocked(service: &EventService, event_id: &str) -> bool {
    service
        .locks()
        .is_allowed_to_operate(&key(event_id), "anyone")
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_execute_unconstrained_event() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(HOST_A, WAIT, vec![event("e1", included(), RelationSet::default())])
        .await
        .unwrap();

    assert!(a.execute(&key("e1"), Some(&teacher())).await.unwrap());

    assert!(a.is_executed(&key("e1"), "observer").await.unwrap());
    assert!(unlocked(&a, "e1").await);
}

#[tokio::test]
async fn test_unmet_condition_blocks_execution() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e2",
                included(),
                RelationSet::default().with(RelationKind::Condition, on(HOST_B, "e3")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("e3", included(), RelationSet::default())])
        .await
        .unwrap();

    assert!(!a.is_executable(&key("e2")).await.unwrap());
    assert!(matches!(
        a.execute(&key("e2"), Some(&teacher())).await,
        Err(EventError::NotExecutable(_))
    ));
    assert!(!a.is_executed(&key("e2"), "observer").await.unwrap());
    assert_eq!(gateway.count(GatewayCall::Lock), 0);

    // Once the condition target has executed, e2 becomes executable
    assert!(b.execute(&key("e3"), Some(&teacher())).await.unwrap());
    assert!(a.is_executable(&key("e2")).await.unwrap());
    assert!(a.execute(&key("e2"), Some(&teacher())).await.unwrap());
}

#[tokio::test]
async fn test_excluded_condition_target_is_satisfied() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e2",
                included(),
                RelationSet::default().with(RelationKind::Condition, on(HOST_B, "e3")),
            )],
        )
        .await
        .unwrap();
    gateway
        .spawn_host(
            HOST_B,
            WAIT,
            vec![event("e3", EventState::new(false, false, false), RelationSet::default())],
        )
        .await
        .unwrap();

    assert!(a.is_executable(&key("e2")).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_condition_target_blocks_execution() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e2",
                included(),
                RelationSet::default().with(RelationKind::Condition, on(HOST_C, "gone")),
            )],
        )
        .await
        .unwrap();

    assert!(matches!(
        a.execute(&key("e2"), Some(&teacher())).await,
        Err(EventError::NotExecutable(_))
    ));
}

#[tokio::test]
async fn test_wrong_role_rejected_before_locking() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e1",
                included(),
                RelationSet::default().with(RelationKind::Response, on(HOST_B, "e2")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("e2", included(), RelationSet::default())])
        .await
        .unwrap();

    let student = RoleDto::new(["Student"]);
    assert!(matches!(
        a.execute(&key("e1"), Some(&student)).await,
        Err(EventError::Unauthorized(_))
    ));

    assert_eq!(gateway.count(GatewayCall::Lock), 0);
    assert!(unlocked(&a, "e1").await);
    assert!(unlocked(&b, "e2").await);
    assert!(!a.is_executed(&key("e1"), "observer").await.unwrap());
}

#[tokio::test]
async fn test_failed_propagation_still_unlocks_and_commits() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e4",
                included(),
                RelationSet::default().with(RelationKind::Response, on(HOST_B, "e5")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("e5", included(), RelationSet::default())])
        .await
        .unwrap();
    gateway.fail(key("e5"), GatewayCall::SendPending);

    assert!(matches!(
        a.execute(&key("e4"), Some(&teacher())).await,
        Err(EventError::FailedToUpdateStateAtOtherEvent(_))
    ));

    assert!(a.is_executed(&key("e4"), "observer").await.unwrap());
    assert!(unlocked(&a, "e4").await);
    assert!(unlocked(&b, "e5").await);
    assert!(!b.get_state(&key("e5"), "observer").await.unwrap().pending);
    assert_eq!(gateway.count_for(&key("e5"), GatewayCall::Unlock), 1);
}

#[tokio::test]
async fn test_propagation_reaches_every_relation_kind() {
    let gateway = Arc::new(InProcessGateway::new());
    let relations = RelationSet::default()
        .with(RelationKind::Response, on(HOST_B, "review"))
        .with(RelationKind::Inclusion, on(HOST_B, "grade"))
        .with(RelationKind::Exclusion, on(HOST_C, "withdraw"));
    let a = gateway
        .spawn_host(HOST_A, WAIT, vec![event("submit", included(), relations)])
        .await
        .unwrap();
    let b = gateway
        .spawn_host(
            HOST_B,
            WAIT,
            vec![
                event("review", included(), RelationSet::default()),
                event("grade", EventState::new(false, false, false), RelationSet::default()),
            ],
        )
        .await
        .unwrap();
    let c = gateway
        .spawn_host(HOST_C, WAIT, vec![event("withdraw", included(), RelationSet::default())])
        .await
        .unwrap();

    assert!(a.execute(&key("submit"), Some(&teacher())).await.unwrap());

    assert!(b.get_state(&key("review"), "observer").await.unwrap().pending);
    assert!(b.is_included(&key("grade"), "observer").await.unwrap());
    assert!(!c.is_included(&key("withdraw"), "observer").await.unwrap());
    for (service, id) in [(&a, "submit"), (&b, "review"), (&b, "grade"), (&c, "withdraw")] {
        assert!(unlocked(service, id).await, "{} left locked", id);
    }
}

#[tokio::test]
async fn test_self_exclusion_and_response_to_self() {
    let gateway = Arc::new(InProcessGateway::new());
    let relations = RelationSet::default()
        .with(RelationKind::Exclusion, on(HOST_A, "once"))
        .with(RelationKind::Response, on(HOST_A, "once"));
    let a = gateway
        .spawn_host(HOST_A, WAIT, vec![event("once", included(), relations)])
        .await
        .unwrap();

    assert!(a.execute(&key("once"), Some(&teacher())).await.unwrap());

    let state = a.get_state(&key("once"), "observer").await.unwrap();
    assert!(state.executed);
    assert!(!state.included);
    assert!(!state.pending);
    assert!(!state.executable);
    assert_eq!(gateway.count(GatewayCall::Lock), 0);
    assert!(unlocked(&a, "once").await);
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_partial_lock_is_compensated() {
    let gateway = Arc::new(InProcessGateway::new());
    let relations = RelationSet::default()
        .with(RelationKind::Response, on(HOST_B, "d1"))
        .with(RelationKind::Inclusion, on(HOST_B, "d2"))
        .with(RelationKind::Exclusion, on(HOST_C, "d3"));
    let a = gateway
        .spawn_host(HOST_A, WAIT, vec![event("root", included(), relations)])
        .await
        .unwrap();
    let b = gateway
        .spawn_host(
            HOST_B,
            WAIT,
            vec![
                event("d1", included(), RelationSet::default()),
                event("d2", included(), RelationSet::default()),
            ],
        )
        .await
        .unwrap();
    let c = gateway
        .spawn_host(HOST_C, WAIT, vec![event("d3", included(), RelationSet::default())])
        .await
        .unwrap();
    gateway.fail(key("d3"), GatewayCall::Lock);

    assert!(!a.locks().lock_all(&key("root")).await.unwrap());

    assert!(unlocked(&a, "root").await);
    assert!(unlocked(&b, "d1").await);
    assert!(unlocked(&b, "d2").await);
    assert!(unlocked(&c, "d3").await);

    assert!(matches!(
        a.execute(&key("root"), Some(&teacher())).await,
        Err(EventError::FailedToLockOtherEvent(_))
    ));
    assert!(!a.is_executed(&key("root"), "observer").await.unwrap());
    assert!(!b.get_state(&key("d1"), "observer").await.unwrap().pending);
}

#[tokio::test]
async fn test_dependent_held_by_other_execution_fails_lock() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e1",
                included(),
                RelationSet::default().with(RelationKind::Response, on(HOST_B, "shared")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("shared", included(), RelationSet::default())])
        .await
        .unwrap();
    b.locks().lock_self(&key("shared"), "other").await.unwrap();

    assert!(matches!(
        a.execute(&key("e1"), Some(&teacher())).await,
        Err(EventError::FailedToLockOtherEvent(_))
    ));
    assert!(unlocked(&a, "e1").await);
    assert!(!b
        .locks()
        .is_allowed_to_operate(&key("shared"), "e1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unlock_failure_reported_distinctly() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e1",
                included(),
                RelationSet::default().with(RelationKind::Response, on(HOST_B, "e2")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("e2", included(), RelationSet::default())])
        .await
        .unwrap();
    gateway.fail(key("e2"), GatewayCall::Unlock);

    assert!(matches!(
        a.execute(&key("e1"), Some(&teacher())).await,
        Err(EventError::FailedToUnlockOtherEvent(_))
    ));

    // Local state committed, own lock released, the dependent needs a reset
    assert!(a.is_executed(&key("e1"), "observer").await.unwrap());
    assert!(unlocked(&a, "e1").await);
    assert!(!unlocked(&b, "e2").await);
    assert_eq!(gateway.count_for(&key("e2"), GatewayCall::Unlock), 1);

    b.reset_event(&key("e2")).await.unwrap();
    assert!(unlocked(&b, "e2").await);
}

#[tokio::test]
async fn test_reader_waits_for_execution_to_finish() {
    let gateway = Arc::new(InProcessGateway::new());
    let b = gateway
        .spawn_host(
            HOST_B,
            Duration::from_secs(2),
            vec![event("e2", included(), RelationSet::default())],
        )
        .await
        .unwrap();
    b.locks().lock_self(&key("e2"), "e1").await.unwrap();

    let reader = {
        let b = b.clone();
        tokio::spawn(async move { b.is_included(&key("e2"), "e9").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    b.set_included(&key("e2"), "e1", false).await.unwrap();
    b.locks().unlock_self(&key("e2"), "e1").await.unwrap();

    assert!(!reader.await.unwrap().unwrap());
}

#[tokio::test]
async fn test_concurrent_executions_of_shared_dependent() {
    let gateway = Arc::new(InProcessGateway::new());
    let shared = on(HOST_C, "shared");
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![
                event("left", included(), RelationSet::default().with(RelationKind::Response, shared.clone())),
                event("right", included(), RelationSet::default().with(RelationKind::Response, shared)),
            ],
        )
        .await
        .unwrap();
    let c = gateway
        .spawn_host(HOST_C, WAIT, vec![event("shared", included(), RelationSet::default())])
        .await
        .unwrap();

    let roles = teacher();
    let left_key = key("left");
    let right_key = key("right");
    let (left, right) = tokio::join!(
        a.execute(&left_key, Some(&roles)),
        a.execute(&right_key, Some(&roles)),
    );

    let succeeded = [&left, &right].iter().filter(|r| r.is_ok()).count();
    assert!(succeeded >= 1);
    for result in [&left, &right] {
        if let Err(err) = result {
            assert!(matches!(err, EventError::FailedToLockOtherEvent(_)), "{:?}", err);
        }
    }
    assert!(c.get_state(&key("shared"), "observer").await.unwrap().pending);
    assert!(unlocked(&c, "shared").await);
}

#[tokio::test]
async fn test_concurrent_executions_of_same_event() {
    let gateway = Arc::new(InProcessGateway::new());
    gateway.set_latency(Duration::from_millis(20));
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e1",
                included(),
                RelationSet::default().with(RelationKind::Response, on(HOST_B, "e2")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("e2", included(), RelationSet::default())])
        .await
        .unwrap();

    let roles = teacher();
    let e1 = key("e1");
    let (first, second) = tokio::join!(
        a.execute(&e1, Some(&roles)),
        a.execute(&e1, Some(&roles)),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| matches!(r, Ok(true))).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(EventError::Conflict(_))))
            .count(),
        1
    );
    assert_eq!(gateway.count_for(&key("e2"), GatewayCall::Lock), 1);
    assert_eq!(gateway.count_for(&key("e2"), GatewayCall::SendPending), 1);
    assert!(unlocked(&a, "e1").await);
    assert!(unlocked(&b, "e2").await);

    // Once the first execution is over the event may run again
    assert!(a.execute(&e1, Some(&roles)).await.unwrap());
}

#[tokio::test]
async fn test_same_event_id_in_other_workflow_cannot_use_lock() {
    let gateway = Arc::new(InProcessGateway::new());
    let a = gateway
        .spawn_host(
            HOST_A,
            WAIT,
            vec![event(
                "e1",
                included(),
                RelationSet::default().with(RelationKind::Response, on(HOST_B, "d")),
            )],
        )
        .await
        .unwrap();
    let b = gateway
        .spawn_host(HOST_B, WAIT, vec![event("d", included(), RelationSet::default())])
        .await
        .unwrap();

    assert!(a.locks().lock_all(&key("e1")).await.unwrap());

    let impostor = EventKey::new("another-workflow", "e1").owner_id();
    assert!(matches!(
        b.set_pending(&key("d"), &impostor, true).await,
        Err(EventError::Conflict(_))
    ));
    b.set_pending(&key("d"), &key("e1").owner_id(), true)
        .await
        .unwrap();

    assert!(a.locks().unlock_all(&key("e1")).await.unwrap());
    assert!(unlocked(&b, "d").await);
}
