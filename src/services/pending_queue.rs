// ============================================================================
// COLA PERSISTENTE DE ACCIONES PENDIENTES
// ============================================================================
// Mutaciones que fallaron o se intentaron sin conexión. Se persisten al
// instante, se reproducen en orden FIFO estricto y con reintentos acotados.
// Las entradas FAILED se conservan hasta que el usuario las borra.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::{OrderingPolicy, ResilienceConfig};
use crate::models::{
    ActionId, ActionStatus, DrainReport, DrainSkip, PendingAction, PerformOutcome, PersistedQueue,
    QueueSnapshot, RetryOutcome,
};
use crate::services::replayer::Replayer;
use crate::state::{Observers, SubscriptionId};
use crate::utils::constants::QUEUE_FORMAT_VERSION;
use crate::utils::{load_json, save_json, Clock, KeyValueStore};

pub struct PendingActionQueue {
    storage: Rc<dyn KeyValueStore>,
    clock: Rc<dyn Clock>,
    storage_key: String,
    default_max_retries: u32,
    ordering: OrderingPolicy,
    actions: RefCell<Vec<PendingAction>>,
    next_sequence: Cell<u64>,
    draining: Cell<bool>,
    // Un drenado se pidió mientras otro estaba en curso
    rerun_requested: Cell<bool>,
    degraded: Cell<bool>,
    observers: Observers<QueueSnapshot>,
}

/// Exclusión de drenados/reintentos: se libera al terminar o al soltar el future
struct DrainGuard<'a> {
    queue: &'a PendingActionQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.draining.set(false);
        self.queue.notify();
    }
}

impl PendingActionQueue {
    /// Reconstruye la cola desde el almacenamiento (recarga de página)
    pub fn restore(
        storage: Rc<dyn KeyValueStore>,
        clock: Rc<dyn Clock>,
        config: &ResilienceConfig,
    ) -> Self {
        let mut actions = Self::load(storage.as_ref(), &config.queue_storage_key);
        actions.sort_by_key(|a| a.sequence);
        for action in actions.iter_mut() {
            action.normalize();
        }
        let next_sequence = actions.last().map(|a| a.sequence + 1).unwrap_or(0);

        if !actions.is_empty() {
            let failed = actions.iter().filter(|a| a.is_failed()).count();
            log::info!(
                "📋 Cola cargada: {} acciones pendientes ({} FAILED)",
                actions.len(),
                failed
            );
        }

        Self {
            storage,
            clock,
            storage_key: config.queue_storage_key.clone(),
            default_max_retries: config.default_max_retries.max(1),
            ordering: config.ordering,
            actions: RefCell::new(actions),
            next_sequence: Cell::new(next_sequence),
            draining: Cell::new(false),
            rerun_requested: Cell::new(false),
            degraded: Cell::new(false),
            observers: Observers::new(),
        }
    }

    fn load(storage: &dyn KeyValueStore, key: &str) -> Vec<PendingAction> {
        match load_json::<PersistedQueue>(storage, key) {
            Ok(Some(queue)) if queue.version == QUEUE_FORMAT_VERSION => queue.actions,
            Ok(Some(queue)) => {
                log::warn!(
                    "⚠️ Cola persistida con versión desconocida ({}), se ignora",
                    queue.version
                );
                Vec::new()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("⚠️ No se pudo cargar la cola persistida: {}", e);
                Vec::new()
            }
        }
    }

    // ==========================================
    // ESCRITURA
    // ==========================================

    /// Añade una acción con el límite de reintentos por defecto
    pub fn enqueue(&self, kind: impl Into<String>, payload: serde_json::Value) -> ActionId {
        self.enqueue_with_retries(kind, payload, self.default_max_retries)
    }

    /// Añade una acción. Nunca falla: si la persistencia falla la acción
    /// queda en memoria para esta sesión.
    pub fn enqueue_with_retries(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
        max_retries: u32,
    ) -> ActionId {
        let sequence = self.reserve_sequence();
        self.insert_action(sequence, kind.into(), payload, max_retries)
    }

    /// Intenta aplicar directamente una mutación nueva y solo la encola si
    /// falla. Si ya hay acciones en cola se encola sin intentarlo, para no
    /// adelantarlas. La posición FIFO se reserva antes del intento: lo que se
    /// encole mientras tanto queda detrás.
    pub async fn submit(
        &self,
        kind: &str,
        payload: serde_json::Value,
        replayer: &dyn Replayer,
    ) -> PerformOutcome {
        if !self.is_empty() {
            return PerformOutcome::Queued(self.enqueue(kind, payload));
        }
        let Some(_guard) = self.begin_exclusive() else {
            return PerformOutcome::Queued(self.enqueue(kind, payload));
        };

        let sequence = self.reserve_sequence();
        match replayer.replay(kind, &payload).await {
            Ok(()) => PerformOutcome::Applied,
            Err(e) => {
                log::warn!("⚠️ {} falló, se guarda para reintentar: {}", kind, e);
                let max_retries = self.default_max_retries;
                let id = self.insert_action(sequence, kind.to_string(), payload, max_retries);
                PerformOutcome::Queued(id)
            }
        }
    }

    /// Borra una entrada sea cual sea su estado. Acción explícita del usuario.
    pub fn clear(&self, id: &ActionId) -> bool {
        let removed = self.remove_entry(id);
        if removed {
            log::info!("🗑️ Acción eliminada: {}", id);
        }
        removed
    }

    pub fn clear_all(&self) -> usize {
        let removed = {
            let mut actions = self.actions.borrow_mut();
            let count = actions.len();
            actions.clear();
            count
        };
        if removed > 0 {
            log::info!("🗑️ Cola limpiada: {} acciones", removed);
            self.changed();
        }
        removed
    }

    // ==========================================
    // LECTURA
    // ==========================================

    /// Entradas en orden de creación
    pub fn list(&self) -> Vec<PendingAction> {
        self.actions.borrow().clone()
    }

    pub fn get(&self, id: &ActionId) -> Option<PendingAction> {
        self.actions.borrow().iter().find(|a| &a.id == id).cloned()
    }

    pub fn count(&self) -> usize {
        self.actions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.borrow().is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.actions.borrow().iter().filter(|a| a.is_failed()).count()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    /// `true` desde que una escritura falla hasta la siguiente que funciona
    pub fn is_persistence_degraded(&self) -> bool {
        self.degraded.get()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.count(),
            failed: self.failed_count(),
            draining: self.is_draining(),
        }
    }

    /// `true` (una sola vez) si algún drenado se ignoró por haber otro en
    /// curso desde la última consulta
    pub fn take_rerun_request(&self) -> bool {
        self.rerun_requested.replace(false)
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&QueueSnapshot) + 'static,
    {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ==========================================
    // REPRODUCCIÓN
    // ==========================================

    /// Reproduce las entradas en orden de creación, una cada vez.
    ///
    /// Con `OrderingPolicy::Strict` el drenado se detiene en la primera
    /// entrada que no se aplica (ya FAILED o que acaba de fallar): ninguna
    /// acción adelanta a una anterior. Con `Independent` esas entradas se
    /// saltan. Un segundo drenado mientras hay uno en curso se ignora.
    pub async fn drain(&self, replayer: &dyn Replayer) -> DrainReport {
        let Some(_guard) = self.begin_exclusive() else {
            log::warn!("⏳ Drenado ya en curso, se repetirá al terminar");
            self.rerun_requested.set(true);
            return DrainReport::skipped(DrainSkip::AlreadyRunning);
        };

        let mut report = DrainReport::default();
        let mut cursor: Option<u64> = None;
        log::info!("🔄 Procesando cola: {} acciones", self.count());

        while let Some(action) = self.next_after(cursor) {
            cursor = Some(action.sequence);

            if !action.is_replayable() {
                if self.ordering == OrderingPolicy::Strict {
                    self.mark_blocked(&mut report, &action, cursor);
                    break;
                }
                log::debug!("⏭️ Saltando acción FAILED {}", action.id);
                continue;
            }

            log::debug!(
                "📤 Reproduciendo {} ({}), intento {}",
                action.kind,
                action.id,
                action.retry_count + 1
            );
            match replayer.replay(&action.kind, &action.payload).await {
                Ok(()) => {
                    self.remove_entry(&action.id);
                    report.succeeded.push(action.id);
                }
                Err(e) => {
                    let exhausted = self.record_failure(&action.id, e.to_string());
                    report.failed.push(action.id.clone());
                    if exhausted {
                        log::warn!("❌ Acción {} agotó sus reintentos: {}", action.id, e);
                        report.exhausted.push(action.id.clone());
                    } else {
                        log::warn!("⚠️ Acción {} falló, se reintentará: {}", action.id, e);
                    }
                    if self.ordering == OrderingPolicy::Strict {
                        self.mark_blocked(&mut report, &action, cursor);
                        break;
                    }
                }
            }
        }

        log::info!(
            "✅ Drenado terminado: {} aplicadas, {} fallidas, {} restantes",
            report.succeeded.len(),
            report.failed.len(),
            self.count()
        );
        report
    }

    /// Reintento manual de una entrada FAILED: el contador vuelve a 0 antes
    /// de intentarlo una vez.
    pub async fn retry_one(&self, id: &ActionId, replayer: &dyn Replayer) -> RetryOutcome {
        let Some(_guard) = self.begin_exclusive() else {
            return RetryOutcome::Busy;
        };

        let action = match self.get(id) {
            Some(action) => action,
            None => return RetryOutcome::NotFound,
        };
        if !action.is_failed() {
            return RetryOutcome::NotFailed(action.status);
        }

        log::info!("🔁 Reintento manual de {} ({})", action.kind, id);
        self.update_entry(id, |a| a.reset_for_manual_retry());

        match replayer.replay(&action.kind, &action.payload).await {
            Ok(()) => {
                self.remove_entry(id);
                RetryOutcome::Succeeded
            }
            Err(e) => {
                let error = e.to_string();
                self.record_failure(id, error.clone());
                let status = self.get(id).map(|a| a.status).unwrap_or(ActionStatus::Failed);
                log::warn!("⚠️ Reintento manual de {} falló: {}", id, error);
                RetryOutcome::Failed { status, error }
            }
        }
    }

    // ==========================================
    // INTERNOS
    // ==========================================

    fn begin_exclusive(&self) -> Option<DrainGuard<'_>> {
        if self.draining.replace(true) {
            return None;
        }
        self.notify();
        Some(DrainGuard { queue: self })
    }

    fn reserve_sequence(&self) -> u64 {
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        sequence
    }

    fn insert_action(
        &self,
        sequence: u64,
        kind: String,
        payload: serde_json::Value,
        max_retries: u32,
    ) -> ActionId {
        let now = self.clock.now();
        let action = PendingAction::new(sequence, kind, payload, max_retries.max(1), now);
        let id = action.id.clone();
        log::info!("📝 Acción encolada: {} ({})", action.kind, id);

        {
            let mut actions = self.actions.borrow_mut();
            let position = actions.partition_point(|a| a.sequence < sequence);
            actions.insert(position, action);
        }
        self.changed();
        id
    }

    fn next_after(&self, cursor: Option<u64>) -> Option<PendingAction> {
        self.actions
            .borrow()
            .iter()
            .find(|a| cursor.map_or(true, |c| a.sequence > c))
            .cloned()
    }

    fn mark_blocked(&self, report: &mut DrainReport, action: &PendingAction, cursor: Option<u64>) {
        if self.next_after(cursor).is_some() {
            log::warn!("⛔ {} bloquea las acciones posteriores", action.id);
            report.blocked_by = Some(action.id.clone());
        }
    }

    /// Devuelve `true` si la entrada pasó a FAILED. Si la entrada se borró
    /// durante la reproducción no hay nada que actualizar.
    fn record_failure(&self, id: &ActionId, error: String) -> bool {
        let now = self.clock.now();
        self.update_entry(id, |a| a.record_failure(error, now)).unwrap_or(false)
    }

    fn update_entry<R>(&self, id: &ActionId, f: impl FnOnce(&mut PendingAction) -> R) -> Option<R> {
        let result = {
            let mut actions = self.actions.borrow_mut();
            actions.iter_mut().find(|a| &a.id == id).map(f)
        };
        if result.is_some() {
            self.changed();
        }
        result
    }

    fn remove_entry(&self, id: &ActionId) -> bool {
        let removed = {
            let mut actions = self.actions.borrow_mut();
            let before = actions.len();
            actions.retain(|a| &a.id != id);
            actions.len() != before
        };
        if removed {
            self.changed();
        }
        removed
    }

    fn changed(&self) {
        self.persist();
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        self.observers.notify(&snapshot);
    }

    fn persist(&self) {
        let result = {
            let actions = self.actions.borrow();
            if actions.is_empty() {
                self.storage.remove(&self.storage_key)
            } else {
                let envelope = PersistedQueue::new(actions.clone());
                save_json(self.storage.as_ref(), &self.storage_key, &envelope)
            }
        };

        match result {
            Ok(()) => {
                if self.degraded.replace(false) {
                    log::info!("💾 Persistencia de la cola recuperada");
                }
            }
            Err(e) => {
                if !self.degraded.replace(true) {
                    log::warn!("⚠️ Cola sin persistir, se mantiene en memoria: {}", e);
                } else {
                    log::debug!("⚠️ Cola sigue sin persistir: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReplayError;
    use crate::testing::{ManualReplayer, ManualTime, ScriptedReplayer};
    use crate::utils::MemoryStore;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use serde_json::json;

    fn queue_with(store: Rc<MemoryStore>, config: &ResilienceConfig) -> PendingActionQueue {
        PendingActionQueue::restore(store, Rc::new(ManualTime::new()), config)
    }

    fn queue() -> (Rc<MemoryStore>, PendingActionQueue) {
        let store = Rc::new(MemoryStore::new());
        let queue = queue_with(store.clone(), &ResilienceConfig::default());
        (store, queue)
    }

    fn kinds(queue: &PendingActionQueue) -> Vec<String> {
        queue.list().into_iter().map(|a| a.kind).collect()
    }

    #[test]
    fn list_preserves_creation_order() {
        let (_, queue) = queue();
        for kind in ["a", "b", "c", "d"] {
            queue.enqueue(kind, json!({}));
        }
        assert_eq!(kinds(&queue), vec!["a", "b", "c", "d"]);
        let sequences: Vec<u64> = queue.list().iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn enqueue_persists_immediately_with_defaults() {
        let (store, queue) = queue();
        let id = queue.enqueue("finding.create", json!({"title": "SQLi"}));

        let action = queue.get(&id).unwrap();
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.max_retries, 3);
        assert_eq!(action.status, ActionStatus::Pending);

        let raw = store.raw("pending_actions_queue").unwrap();
        let persisted: PersistedQueue = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.actions, queue.list());
    }

    #[test]
    fn successful_drain_empties_queue_in_order() {
        let (store, queue) = queue();
        queue.enqueue("a", json!(1));
        queue.enqueue("b", json!(2));
        let replayer = ScriptedReplayer::succeeding();

        let report = block_on(queue.drain(&replayer));

        assert_eq!(replayer.calls(), vec!["a", "b"]);
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.failed.is_empty());
        assert!(queue.is_empty());
        assert_eq!(store.raw("pending_actions_queue"), None);
    }

    #[test]
    fn three_failed_drains_exhaust_an_entry() {
        let (_, queue) = queue();
        let id = queue.enqueue("scope.update", json!({}));
        let replayer = ScriptedReplayer::failing_kinds(&["scope.update"]);

        for expected in 1..=2 {
            let report = block_on(queue.drain(&replayer));
            assert_eq!(report.failed, vec![id.clone()]);
            assert!(report.exhausted.is_empty());
            let action = queue.get(&id).unwrap();
            assert_eq!(action.retry_count, expected);
            assert_eq!(action.status, ActionStatus::Retrying);
        }

        let report = block_on(queue.drain(&replayer));
        assert_eq!(report.exhausted, vec![id.clone()]);
        let action = queue.get(&id).unwrap();
        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.retry_count, 3);

        // Un cuarto drenado no vuelve a intentarlo
        let report = block_on(queue.drain(&replayer));
        assert_eq!(report.attempted(), 0);
        assert_eq!(replayer.call_count(), 3);
        assert_eq!(queue.get(&id).unwrap().retry_count, 3);
    }

    #[test]
    fn failed_entry_blocks_later_entries() {
        let (_, queue) = queue();
        let a = queue.enqueue_with_retries("A", json!({}), 1);
        let b = queue.enqueue_with_retries("B", json!({}), 1);
        let c = queue.enqueue_with_retries("C", json!({}), 1);
        let replayer = ScriptedReplayer::failing_kinds(&["B"]);

        let report = block_on(queue.drain(&replayer));

        assert_eq!(replayer.calls(), vec!["A", "B"]);
        assert_eq!(report.succeeded, vec![a]);
        assert_eq!(report.exhausted, vec![b.clone()]);
        assert_eq!(report.blocked_by, Some(b.clone()));

        let b_entry = queue.get(&b).unwrap();
        assert_eq!(b_entry.status, ActionStatus::Failed);
        assert_eq!(b_entry.retry_count, 1);
        // C no se intentó y sigue en la cola, detrás de B
        assert_eq!(queue.get(&c).unwrap().status, ActionStatus::Pending);
        assert_eq!(kinds(&queue), vec!["B", "C"]);

        // B sigue bloqueando en drenados posteriores
        let report = block_on(queue.drain(&replayer));
        assert_eq!(report.blocked_by, Some(b));
        assert_eq!(replayer.calls(), vec!["A", "B"]);
    }

    #[test]
    fn retrying_entry_is_not_overtaken_under_strict_ordering() {
        let (_, queue) = queue();
        queue.enqueue("first", json!({}));
        queue.enqueue("second", json!({}));
        let replayer = ScriptedReplayer::failing_kinds(&["first"]);

        block_on(queue.drain(&replayer));
        assert_eq!(replayer.calls(), vec!["first"]);

        replayer.succeed_kind("first");
        block_on(queue.drain(&replayer));
        assert_eq!(replayer.calls(), vec!["first", "first", "second"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn offline_replay_failures_record_last_error() {
        let (_, queue) = queue();
        let id = queue.enqueue("scope.update", json!({"id": 9}));
        let replayer = ScriptedReplayer::succeeding();
        replayer.fail_next(1);

        let report = block_on(queue.drain(&replayer));
        assert_eq!(report.failed, vec![id.clone()]);
        let action = queue.get(&id).unwrap();
        assert_eq!(action.status, ActionStatus::Retrying);
        assert!(action.is_replayable());
        assert_eq!(action.last_error.as_deref(), Some("sin conexión"));
        assert!(action.last_attempt_at.is_some());

        block_on(queue.drain(&replayer));
        assert!(queue.is_empty());
        assert_eq!(replayer.call_count(), 2);
    }

    #[test]
    fn independent_ordering_skips_failed_entries() {
        let config = ResilienceConfig {
            ordering: OrderingPolicy::Independent,
            ..ResilienceConfig::default()
        };
        let queue = queue_with(Rc::new(MemoryStore::new()), &config);
        queue.enqueue_with_retries("A", json!({}), 1);
        let b = queue.enqueue_with_retries("B", json!({}), 1);
        queue.enqueue_with_retries("C", json!({}), 1);
        let replayer = ScriptedReplayer::failing_kinds(&["B"]);

        let report = block_on(queue.drain(&replayer));

        assert_eq!(replayer.calls(), vec!["A", "B", "C"]);
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.blocked_by, None);
        assert_eq!(queue.list().iter().map(|a| a.id.clone()).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn retry_one_resets_count_and_unblocks() {
        let (_, queue) = queue();
        let b = queue.enqueue_with_retries("B", json!({}), 2);
        queue.enqueue("C", json!({}));
        let replayer = ScriptedReplayer::failing_kinds(&["B"]);
        block_on(queue.drain(&replayer));
        block_on(queue.drain(&replayer));
        assert!(queue.get(&b).unwrap().is_failed());

        // Falla otra vez: el contador empezó de 0, así que queda RETRYING
        let outcome = block_on(queue.retry_one(&b, &replayer));
        assert_eq!(
            outcome,
            RetryOutcome::Failed {
                status: ActionStatus::Retrying,
                error: ReplayError::Transport("B".to_string()).to_string(),
            }
        );
        assert_eq!(queue.get(&b).unwrap().retry_count, 1);

        // Ya no está FAILED: el reintento manual no aplica
        assert_eq!(
            block_on(queue.retry_one(&b, &replayer)),
            RetryOutcome::NotFailed(ActionStatus::Retrying)
        );

        replayer.succeed_kind("B");
        block_on(queue.drain(&replayer));
        assert!(queue.is_empty());
    }

    #[test]
    fn retry_one_on_unknown_or_failed_entry() {
        let (_, queue) = queue();
        let replayer = ScriptedReplayer::succeeding();
        assert_eq!(
            block_on(queue.retry_one(&ActionId::from("nope"), &replayer)),
            RetryOutcome::NotFound
        );

        let id = queue.enqueue_with_retries("x", json!({}), 1);
        replayer.fail_kind("x");
        block_on(queue.drain(&replayer));
        replayer.succeed_kind("x");
        assert_eq!(block_on(queue.retry_one(&id, &replayer)), RetryOutcome::Succeeded);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_and_clear_all_remove_regardless_of_status() {
        let (store, queue) = queue();
        let a = queue.enqueue_with_retries("a", json!({}), 1);
        queue.enqueue("b", json!({}));
        block_on(queue.drain(&ScriptedReplayer::failing_kinds(&["a"])));
        assert!(queue.get(&a).unwrap().is_failed());

        assert!(queue.clear(&a));
        assert!(!queue.clear(&a));
        assert_eq!(kinds(&queue), vec!["b"]);

        assert_eq!(queue.clear_all(), 1);
        assert!(queue.is_empty());
        assert_eq!(store.raw("pending_actions_queue"), None);
    }

    #[test]
    fn reload_preserves_pending_and_failed_entries() {
        let store = Rc::new(MemoryStore::new());
        let config = ResilienceConfig::default();
        let before = {
            let queue = queue_with(store.clone(), &config);
            queue.enqueue_with_retries("A", json!({"n": 1}), 1);
            queue.enqueue("B", json!({"n": 2}));
            block_on(queue.drain(&ScriptedReplayer::failing_kinds(&["A"])));
            queue.list()
        };

        let reloaded = queue_with(store.clone(), &config);
        assert_eq!(reloaded.list(), before);
        assert_eq!(reloaded.failed_count(), 1);

        // Las secuencias continúan tras la recarga
        let id = reloaded.enqueue("C", json!({}));
        assert_eq!(reloaded.get(&id).unwrap().sequence, 2);
    }

    #[test]
    fn corrupt_or_unknown_persisted_state_starts_empty() {
        let store = Rc::new(MemoryStore::new());
        store.set("pending_actions_queue", "{garbage").unwrap();
        assert!(queue_with(store.clone(), &ResilienceConfig::default()).is_empty());

        store
            .set("pending_actions_queue", r#"{"version": 99, "actions": []}"#)
            .unwrap();
        assert!(queue_with(store, &ResilienceConfig::default()).is_empty());
    }

    #[test]
    fn persistence_failure_degrades_to_memory() {
        let (store, queue) = queue();
        store.set_fail_writes(true);

        let id = queue.enqueue("a", json!({}));
        assert!(queue.is_persistence_degraded());
        assert_eq!(queue.count(), 1);
        assert!(queue.get(&id).is_some());

        store.set_fail_writes(false);
        queue.enqueue("b", json!({}));
        assert!(!queue.is_persistence_degraded());
        assert!(store.raw("pending_actions_queue").is_some());
    }

    #[test]
    fn concurrent_drain_is_ignored_while_one_is_in_flight() {
        let queue = Rc::new(queue().1);
        queue.enqueue("slow", json!({}));
        let replayer = Rc::new(ManualReplayer::new());
        let mut pool = LocalPool::new();

        let first = Rc::new(RefCell::new(None));
        {
            let (queue, replayer, first) = (queue.clone(), replayer.clone(), first.clone());
            pool.spawner()
                .spawn_local(async move {
                    let report = queue.drain(replayer.as_ref()).await;
                    *first.borrow_mut() = Some(report);
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert!(queue.is_draining());
        assert_eq!(replayer.in_flight(), 1);

        assert!(!queue.take_rerun_request());
        let second = block_on(queue.drain(replayer.as_ref()));
        assert_eq!(second.skipped, Some(DrainSkip::AlreadyRunning));
        assert!(queue.take_rerun_request());
        assert!(!queue.take_rerun_request());
        assert_eq!(
            block_on(queue.retry_one(&queue.list()[0].id, replayer.as_ref())),
            RetryOutcome::Busy
        );

        replayer.resolve_next(Ok(()));
        pool.run_until_stalled();
        assert!(!queue.is_draining());
        assert_eq!(first.borrow().as_ref().unwrap().succeeded.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn submit_applies_directly_when_nothing_is_queued() {
        let (_, queue) = queue();
        let replayer = ScriptedReplayer::succeeding();
        let outcome = block_on(queue.submit("finding.create", json!({"t": 1}), &replayer));
        assert_eq!(outcome, PerformOutcome::Applied);
        assert!(queue.is_empty());

        replayer.fail_kind("finding.create");
        let outcome = block_on(queue.submit("finding.create", json!({"t": 2}), &replayer));
        let PerformOutcome::Queued(id) = outcome else {
            panic!("expected the failed mutation to be queued");
        };
        let action = queue.get(&id).unwrap();
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.status, ActionStatus::Pending);
    }

    #[test]
    fn submit_never_overtakes_queued_work() {
        let (_, queue) = queue();
        queue.enqueue("earlier", json!({}));
        let replayer = ScriptedReplayer::succeeding();

        let outcome = block_on(queue.submit("later", json!({}), &replayer));

        assert!(matches!(outcome, PerformOutcome::Queued(_)));
        assert_eq!(replayer.call_count(), 0);
        assert_eq!(kinds(&queue), vec!["earlier", "later"]);
    }

    #[test]
    fn failed_submit_keeps_its_place_ahead_of_later_mutations() {
        let queue = Rc::new(queue().1);
        let replayer = Rc::new(ManualReplayer::new());
        let mut pool = LocalPool::new();
        {
            let (queue, replayer) = (queue.clone(), replayer.clone());
            pool.spawner()
                .spawn_local(async move {
                    queue.submit("first", json!({}), replayer.as_ref()).await;
                })
                .unwrap();
        }
        pool.run_until_stalled();

        // Mientras "first" está en vuelo, "second" se encola
        let outcome = block_on(queue.submit("second", json!({}), replayer.as_ref()));
        assert!(matches!(outcome, PerformOutcome::Queued(_)));

        replayer.resolve_next(Err(ReplayError::Offline));
        pool.run_until_stalled();
        assert_eq!(kinds(&queue), vec!["first", "second"]);
    }

    #[test]
    fn observers_see_counts_after_each_change() {
        let (_, queue) = queue();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            queue.subscribe(move |s| seen.borrow_mut().push((s.pending, s.failed, s.draining)));
        }
        queue.enqueue_with_retries("a", json!({}), 1);
        block_on(queue.drain(&ScriptedReplayer::failing_kinds(&["a"])));

        let seen = seen.borrow();
        assert_eq!(seen.first(), Some(&(1, 0, false)));
        assert!(seen.contains(&(1, 0, true)));
        assert_eq!(seen.last(), Some(&(1, 1, false)));
    }
}
