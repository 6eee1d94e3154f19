// ============================================================================
// RESILIENCE VIEWMODEL - FACHADA DE LA CAPA OFFLINE
// ============================================================================
// Punto de composición: monitor de red + cola de acciones + borradores.
// La presentación solo lee proyecciones (contadores, booleanos) y emite
// comandos; nunca escribe en el almacenamiento directamente.
// ============================================================================

use std::rc::Rc;

use thiserror::Error;

use crate::config::ResilienceConfig;
use crate::models::{
    ActionId, ConnectivityState, DrainReport, DrainSkip, PendingAction, PerformOutcome,
    QueueSnapshot, RetryOutcome,
};
use crate::services::{ConnectivityMonitor, DraftStore, PendingActionQueue, Replayer};
use crate::state::SubscriptionId;
use crate::utils::{Clock, KeyValueStore, Spawner, SystemClock, Timers};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("falta el colaborador requerido: {0}")]
    MissingCollaborator(&'static str),
}

struct ResilienceInner {
    monitor: Rc<ConnectivityMonitor>,
    queue: Rc<PendingActionQueue>,
    drafts: DraftStore,
    replayer: Rc<dyn Replayer>,
    spawner: Rc<dyn Spawner>,
}

impl ResilienceInner {
    /// Drena y, si llegó otro disparo mientras tanto, vuelve a drenar
    /// mientras siga habiendo conexión.
    async fn run_drain(&self) -> DrainReport {
        if !self.monitor.is_online() {
            log::info!("📴 Sin conexión: drenado pospuesto");
            return DrainReport::skipped(DrainSkip::Offline);
        }

        let mut report = self.queue.drain(self.replayer.as_ref()).await;
        while !report.was_skipped() && self.queue.take_rerun_request() {
            if !self.monitor.is_online() {
                break;
            }
            log::info!("🔁 Nuevo disparo durante el drenado: repitiendo");
            let pass = self.queue.drain(self.replayer.as_ref()).await;
            if pass.was_skipped() {
                break;
            }
            report.succeeded.extend(pass.succeeded);
            report.failed.extend(pass.failed);
            report.exhausted.extend(pass.exhausted);
            report.blocked_by = pass.blocked_by;
        }
        report
    }

    fn spawn_drain(self: &Rc<Self>) {
        let inner = self.clone();
        self.spawner.spawn(Box::pin(async move {
            let report = inner.run_drain().await;
            if !report.exhausted.is_empty() {
                let count = report.exhausted.len();
                log::warn!("❌ {} acciones requieren intervención del usuario", count);
            }
        }));
    }
}

pub struct ResilienceViewModel {
    inner: Rc<ResilienceInner>,
    connectivity_subscription: SubscriptionId,
}

impl ResilienceViewModel {
    pub fn builder() -> ResilienceBuilder {
        ResilienceBuilder::default()
    }

    fn new(inner: ResilienceInner) -> Self {
        let inner = Rc::new(inner);

        // Una única suscripción por instancia: cada OFFLINE→ONLINE drena una vez
        let weak = Rc::downgrade(&inner);
        let connectivity_subscription = inner.monitor.subscribe(move |state| {
            if state != ConnectivityState::Online {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                log::info!("🌐 Conexión restaurada - procesando cola automáticamente");
                inner.spawn_drain();
            }
        });

        Self {
            inner,
            connectivity_subscription,
        }
    }

    // ==========================================
    // PROYECCIONES DE SOLO LECTURA
    // ==========================================

    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.inner.monitor.current_state()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.count()
    }

    pub fn failed_count(&self) -> usize {
        self.inner.queue.failed_count()
    }

    pub fn pending_actions(&self) -> Vec<PendingAction> {
        self.inner.queue.list()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.queue.is_draining()
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.inner.queue.snapshot()
    }

    pub fn has_draft(&self, form_id: &str) -> bool {
        self.inner.drafts.has_draft(form_id)
    }

    /// Borradores: `record_change`, `get_draft`, `recover`, `clear_draft`...
    pub fn drafts(&self) -> &DraftStore {
        &self.inner.drafts
    }

    pub fn subscribe_pending<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&QueueSnapshot) + 'static,
    {
        self.inner.queue.subscribe(listener)
    }

    pub fn unsubscribe_pending(&self, id: SubscriptionId) -> bool {
        self.inner.queue.unsubscribe(id)
    }

    pub fn subscribe_connectivity<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(ConnectivityState) + 'static,
    {
        self.inner.monitor.subscribe(listener)
    }

    pub fn unsubscribe_connectivity(&self, id: SubscriptionId) -> bool {
        self.inner.monitor.unsubscribe(id)
    }

    // ==========================================
    // COMANDOS
    // ==========================================

    /// Drenado manual ("Reintentar"). Sin conexión no se ejecuta, para no
    /// gastar reintentos.
    pub async fn trigger_drain(&self) -> DrainReport {
        self.inner.run_drain().await
    }

    /// Igual que `trigger_drain` pero sin esperar el resultado
    pub fn spawn_drain(&self) {
        self.inner.spawn_drain();
    }

    pub fn enqueue(&self, kind: &str, payload: serde_json::Value) -> ActionId {
        self.inner.queue.enqueue(kind, payload)
    }

    pub fn enqueue_with_retries(
        &self,
        kind: &str,
        payload: serde_json::Value,
        max_retries: u32,
    ) -> ActionId {
        self.inner.queue.enqueue_with_retries(kind, payload, max_retries)
    }

    /// Ejecuta una mutación: directa si hay conexión y nada en cola; si no,
    /// o si falla, queda encolada.
    pub async fn perform(&self, kind: &str, payload: serde_json::Value) -> PerformOutcome {
        if !self.is_online() {
            log::info!("📴 Sin conexión: {} encolada", kind);
            return PerformOutcome::Queued(self.inner.queue.enqueue(kind, payload));
        }

        let replayer = self.inner.replayer.as_ref();
        let outcome = self.inner.queue.submit(kind, payload, replayer).await;
        // Lo encolado durante el intento directo sale ya
        self.drain_after_exclusive(outcome == PerformOutcome::Applied);
        outcome
    }

    /// Reintento manual de una acción FAILED. Si funciona, las acciones que
    /// bloqueaba se drenan a continuación.
    pub async fn retry_action(&self, id: &ActionId) -> RetryOutcome {
        let outcome = self.inner.queue.retry_one(id, self.inner.replayer.as_ref()).await;
        self.drain_after_exclusive(outcome == RetryOutcome::Succeeded);
        outcome
    }

    /// Tras un intento directo o un reintento manual: drena lo que quede si
    /// se pidió, o si un disparo llegó mientras la cola estaba ocupada.
    fn drain_after_exclusive(&self, wanted: bool) {
        let requested = self.inner.queue.take_rerun_request();
        if (wanted || requested) && self.is_online() && !self.inner.queue.is_empty() {
            self.inner.spawn_drain();
        }
    }

    pub fn clear_action(&self, id: &ActionId) -> bool {
        self.inner.queue.clear(id)
    }

    pub fn clear_all_actions(&self) -> usize {
        self.inner.queue.clear_all()
    }

    pub fn is_persistence_degraded(&self) -> bool {
        self.inner.queue.is_persistence_degraded() || self.inner.drafts.is_persistence_degraded()
    }
}

impl Drop for ResilienceViewModel {
    fn drop(&mut self) {
        self.inner.monitor.unsubscribe(self.connectivity_subscription);
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Construye la fachada. Los colaboradores obligatorios se comprueban en
/// `build()`, no en cada llamada.
#[derive(Default)]
pub struct ResilienceBuilder {
    config: Option<ResilienceConfig>,
    monitor: Option<Rc<ConnectivityMonitor>>,
    storage: Option<Rc<dyn KeyValueStore>>,
    replayer: Option<Rc<dyn Replayer>>,
    spawner: Option<Rc<dyn Spawner>>,
    timers: Option<Rc<dyn Timers>>,
    clock: Option<Rc<dyn Clock>>,
}

impl ResilienceBuilder {
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn monitor(mut self, monitor: Rc<ConnectivityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn storage(mut self, storage: Rc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn replayer(mut self, replayer: Rc<dyn Replayer>) -> Self {
        self.replayer = Some(replayer);
        self
    }

    pub fn spawner(mut self, spawner: Rc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn timers(mut self, timers: Rc<dyn Timers>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Opcional: por defecto `SystemClock`
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<ResilienceViewModel, BuildError> {
        let monitor = self
            .monitor
            .ok_or(BuildError::MissingCollaborator("connectivity monitor"))?;
        let storage = self.storage.ok_or(BuildError::MissingCollaborator("storage"))?;
        let replayer = self.replayer.ok_or(BuildError::MissingCollaborator("replayer"))?;
        let spawner = self.spawner.ok_or(BuildError::MissingCollaborator("spawner"))?;
        let timers = self.timers.ok_or(BuildError::MissingCollaborator("timers"))?;
        let clock = self.clock.unwrap_or_else(|| Rc::new(SystemClock));
        let config = self.config.unwrap_or_default();

        let queue = Rc::new(PendingActionQueue::restore(storage.clone(), clock.clone(), &config));
        let drafts = DraftStore::new(storage, clock, timers, &config);

        log::info!(
            "🚀 Capa de resiliencia lista: {} acciones pendientes, red {:?}",
            queue.count(),
            monitor.current_state()
        );

        Ok(ResilienceViewModel::new(ResilienceInner {
            monitor,
            queue,
            drafts,
            replayer,
            spawner,
        }))
    }
}

#[cfg(target_arch = "wasm32")]
impl ResilienceViewModel {
    /// Fachada con los colaboradores del navegador: eventos de red de
    /// window, localStorage (o memoria), `setTimeout` y `spawn_local`.
    pub fn browser(replayer: Rc<dyn Replayer>) -> Result<Self, BuildError> {
        use crate::services::BrowserNetworkSignal;
        use crate::utils::{open_default_storage, BrowserSpawner, BrowserTimers};

        Self::builder()
            .config(crate::config::CONFIG.clone())
            .monitor(BrowserNetworkSignal::monitor())
            .storage(open_default_storage())
            .replayer(replayer)
            .spawner(Rc::new(BrowserSpawner))
            .timers(Rc::new(BrowserTimers))
            .build()
    }
}
