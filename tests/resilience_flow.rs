// Flujos completos a través de la API pública: cortes de red, recargas de
// página y borradores de formularios.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{block_on, LocalPool};
use serde_json::json;

use assessment_resilience::testing::{ManualTime, ScriptedReplayer};
use assessment_resilience::{
    ActionStatus, ConnectivityMonitor, ConnectivityState, MemoryStore, OrderingPolicy,
    PerformOutcome, ReplayError, ResilienceConfig, ResilienceViewModel, RetryOutcome,
};

fn build(
    pool: &LocalPool,
    monitor: &Rc<ConnectivityMonitor>,
    storage: &Rc<MemoryStore>,
    time: &Rc<ManualTime>,
    replayer: Rc<ScriptedReplayer>,
    config: ResilienceConfig,
) -> ResilienceViewModel {
    ResilienceViewModel::builder()
        .config(config)
        .monitor(monitor.clone())
        .storage(storage.clone())
        .replayer(replayer)
        .spawner(Rc::new(pool.spawner()))
        .timers(time.clone())
        .clock(time.clone())
        .build()
        .unwrap()
}

#[test]
fn offline_session_is_replayed_in_order_after_reload_and_reconnect() {
    let mut pool = LocalPool::new();
    let monitor = Rc::new(ConnectivityMonitor::new(ConnectivityState::Offline));
    let storage = Rc::new(MemoryStore::new());
    let time = Rc::new(ManualTime::new());
    let replayer = Rc::new(ScriptedReplayer::succeeding());

    {
        let config = ResilienceConfig::default();
        let vm = build(&pool, &monitor, &storage, &time, replayer.clone(), config);
        block_on(vm.perform("finding.create", json!({"title": "XSS"})));
        block_on(vm.perform("finding.update", json!({"id": 7, "severity": 4})));
        block_on(vm.perform("scope.delete", json!({"id": 3})));
        assert_eq!(vm.pending_count(), 3);
    }

    // Recarga de página: nueva fachada sobre el mismo almacenamiento
    let vm = build(&pool, &monitor, &storage, &time, replayer.clone(), ResilienceConfig::default());
    assert_eq!(vm.pending_count(), 3);
    assert_eq!(replayer.call_count(), 0);

    monitor.apply_signal(ConnectivityState::Online);
    pool.run_until_stalled();

    assert_eq!(replayer.calls(), vec!["finding.create", "finding.update", "scope.delete"]);
    assert_eq!(vm.pending_count(), 0);
    assert!(storage.raw("pending_actions_queue").is_none());
}

#[test]
fn exhausted_action_blocks_later_ones_until_user_acts() {
    let mut pool = LocalPool::new();
    let monitor = Rc::new(ConnectivityMonitor::new(ConnectivityState::Offline));
    let storage = Rc::new(MemoryStore::new());
    let time = Rc::new(ManualTime::new());
    let replayer = Rc::new(ScriptedReplayer::failing_kinds(&["B"]));
    let vm = build(&pool, &monitor, &storage, &time, replayer.clone(), ResilienceConfig::default());

    vm.enqueue_with_retries("A", json!({}), 1);
    let b = vm.enqueue_with_retries("B", json!({}), 1);
    let c = vm.enqueue_with_retries("C", json!({}), 1);

    monitor.apply_signal(ConnectivityState::Online);
    pool.run_until_stalled();

    assert_eq!(replayer.calls(), vec!["A", "B"]);
    let remaining = vm.pending_actions();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].id, b);
    assert_eq!(remaining[0].status, ActionStatus::Failed);
    assert_eq!(remaining[0].last_error.as_deref(), Some("error de red: B"));
    assert_eq!(remaining[1].id, c);
    assert_eq!(remaining[1].status, ActionStatus::Pending);

    // Reconexiones posteriores no saltan la entrada FAILED
    monitor.apply_signal(ConnectivityState::Offline);
    monitor.apply_signal(ConnectivityState::Online);
    pool.run_until_stalled();
    assert_eq!(replayer.call_count(), 2);

    assert!(vm.clear_action(&b));
    block_on(vm.trigger_drain());
    assert_eq!(replayer.calls(), vec!["A", "B", "C"]);
    assert_eq!(vm.pending_count(), 0);
}

#[test]
fn independent_ordering_lets_later_actions_through() {
    let mut pool = LocalPool::new();
    let monitor = Rc::new(ConnectivityMonitor::new(ConnectivityState::Offline));
    let storage = Rc::new(MemoryStore::new());
    let time = Rc::new(ManualTime::new());
    let replayer = Rc::new(ScriptedReplayer::failing_kinds(&["B"]));
    let config = ResilienceConfig {
        ordering: OrderingPolicy::Independent,
        ..ResilienceConfig::default()
    };
    let vm = build(&pool, &monitor, &storage, &time, replayer.clone(), config);

    vm.enqueue("A", json!({}));
    vm.enqueue("B", json!({}));
    vm.enqueue("C", json!({}));

    monitor.apply_signal(ConnectivityState::Online);
    pool.run_until_stalled();

    assert_eq!(replayer.calls(), vec!["A", "B", "C"]);
    let remaining = vm.pending_actions();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].kind, "B");
    assert_eq!(remaining[0].status, ActionStatus::Retrying);
    assert_eq!(remaining[0].retry_count, 1);
}

#[test]
fn manual_retry_of_a_failed_action_resets_its_counter() {
    let pool = LocalPool::new();
    let monitor = Rc::new(ConnectivityMonitor::new(ConnectivityState::Online));
    let storage = Rc::new(MemoryStore::new());
    let time = Rc::new(ManualTime::new());
    let replayer = Rc::new(ScriptedReplayer::failing_kinds(&["report.publish"]));
    let vm = build(&pool, &monitor, &storage, &time, replayer.clone(), ResilienceConfig::default());

    let id = vm.enqueue_with_retries("report.publish", json!({"report": 12}), 2);
    block_on(vm.trigger_drain());
    block_on(vm.trigger_drain());
    assert_eq!(vm.failed_count(), 1);

    match block_on(vm.retry_action(&id)) {
        RetryOutcome::Failed { status, .. } => assert_eq!(status, ActionStatus::Retrying),
        other => panic!("resultado inesperado: {:?}", other),
    }
    let action = vm.pending_actions().remove(0);
    assert_eq!(action.retry_count, 1);
    assert_eq!(action.status, ActionStatus::Retrying);
}

#[test]
fn closures_can_act_as_replayers() {
    let pool = LocalPool::new();
    let monitor = Rc::new(ConnectivityMonitor::new(ConnectivityState::Online));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let replayer = {
        let seen = seen.clone();
        move |kind: String, payload: serde_json::Value| {
            seen.borrow_mut().push((kind.clone(), payload));
            async move {
                if kind == "scope.delete" {
                    Err(ReplayError::Rejected {
                        status: 409,
                        message: "scope en uso".to_string(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    };

    let vm = ResilienceViewModel::builder()
        .monitor(monitor)
        .storage(Rc::new(MemoryStore::new()))
        .replayer(Rc::new(replayer))
        .spawner(Rc::new(pool.spawner()))
        .timers(Rc::new(ManualTime::new()))
        .build()
        .unwrap();

    assert_eq!(block_on(vm.perform("finding.create", json!({"id": 1}))), PerformOutcome::Applied);
    let outcome = block_on(vm.perform("scope.delete", json!({"id": 2})));
    assert!(matches!(outcome, PerformOutcome::Queued(_)));

    let queued = vm.pending_actions().remove(0);
    assert_eq!(queued.kind, "scope.delete");
    assert_eq!(queued.retry_count, 0);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn draft_survives_reload_until_submitted() {
    let pool = LocalPool::new();
    let monitor = Rc::new(ConnectivityMonitor::new(ConnectivityState::Offline));
    let storage = Rc::new(MemoryStore::new());
    let time = Rc::new(ManualTime::new());
    let replayer = Rc::new(ScriptedReplayer::succeeding());

    {
        let config = ResilienceConfig::default();
        let vm = build(&pool, &monitor, &storage, &time, replayer.clone(), config);
        let drafts = vm.drafts();
        drafts.record_change("finding-form", json!({"title": "S"}));
        time.advance(Duration::from_millis(500));
        drafts.record_change("finding-form", json!({"title": "SQLi"}));
        time.advance(Duration::from_millis(1999));
        assert!(!vm.has_draft("finding-form"));
        time.advance(Duration::from_millis(1));
        assert!(vm.has_draft("finding-form"));
    }

    let vm = build(&pool, &monitor, &storage, &time, replayer, ResilienceConfig::default());
    let draft = vm.drafts().get_draft("finding-form").unwrap();
    assert_eq!(draft.data, json!({"title": "SQLi"}));
    assert_eq!(draft.saved_at, time.at(Duration::from_millis(2500)));

    // Envío del formulario
    vm.drafts().clear_draft("finding-form");
    assert!(!vm.has_draft("finding-form"));
    assert!(storage.raw("draft-finding-form").is_none());
    assert!(storage.raw("draft-finding-form-timestamp").is_none());
}
