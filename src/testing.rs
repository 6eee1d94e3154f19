// ============================================================================
// DOBLES DE PRUEBA
// ============================================================================
// Tiempo virtual y replayers controlables, para probar formularios y
// mutaciones contra la capa de resiliencia sin navegador.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;

use crate::models::ReplayError;
use crate::services::Replayer;
use crate::utils::{Clock, TimerHandle, Timers};

struct ScheduledCallback {
    due_ms: u64,
    order: u64,
    callback: Box<dyn FnOnce()>,
}

/// Reloj y temporizadores virtuales: el tiempo solo avanza con `advance`
pub struct ManualTime {
    start: DateTime<Utc>,
    elapsed_ms: Cell<u64>,
    scheduled: Rc<RefCell<Vec<ScheduledCallback>>>,
    next_order: Cell<u64>,
}

impl ManualTime {
    /// Empieza el 2024-01-01T00:00:00Z
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self::starting_at(start)
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            elapsed_ms: Cell::new(0),
            scheduled: Rc::new(RefCell::new(Vec::new())),
            next_order: Cell::new(0),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.get())
    }

    /// Instante absoluto `offset` después del inicio
    pub fn at(&self, offset: Duration) -> DateTime<Utc> {
        self.start + chrono::Duration::milliseconds(offset.as_millis() as i64)
    }

    /// Temporizadores programados que ni han disparado ni se han cancelado
    pub fn pending_timers(&self) -> usize {
        self.scheduled.borrow().len()
    }

    /// Avanza el tiempo ejecutando, en orden, los callbacks que vencen.
    /// Los callbacks pueden programar otros nuevos.
    pub fn advance(&self, by: Duration) {
        let target = self.elapsed_ms.get() + by.as_millis() as u64;
        loop {
            let next = {
                let mut scheduled = self.scheduled.borrow_mut();
                let index = scheduled
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.due_ms <= target)
                    .min_by_key(|(_, s)| (s.due_ms, s.order))
                    .map(|(i, _)| i);
                index.map(|i| scheduled.remove(i))
            };
            match next {
                Some(entry) => {
                    self.elapsed_ms.set(self.elapsed_ms.get().max(entry.due_ms));
                    (entry.callback)();
                }
                None => break,
            }
        }
        self.elapsed_ms.set(target);
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        self.at(self.elapsed())
    }
}

impl Timers for ManualTime {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let order = self.next_order.get();
        self.next_order.set(order + 1);
        self.scheduled.borrow_mut().push(ScheduledCallback {
            due_ms: self.elapsed_ms.get() + delay.as_millis() as u64,
            order,
            callback,
        });

        let scheduled = Rc::downgrade(&self.scheduled);
        TimerHandle::new(move || {
            let Some(scheduled) = scheduled.upgrade() else {
                return;
            };
            // El callback se suelta fuera del borrow
            let cancelled = {
                let mut scheduled = scheduled.borrow_mut();
                let index = scheduled.iter().position(|s| s.order == order);
                index.map(|i| scheduled.remove(i))
            };
            drop(cancelled);
        })
    }
}

/// Replayer síncrono: falla para los `kind` marcados (con
/// `ReplayError::Transport(kind)`) y registra cada llamada.
#[derive(Default)]
pub struct ScriptedReplayer {
    failing: RefCell<HashSet<String>>,
    fail_next: Cell<usize>,
    calls: RefCell<Vec<(String, serde_json::Value)>>,
}

impl ScriptedReplayer {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_kinds(kinds: &[&str]) -> Self {
        let replayer = Self::default();
        for kind in kinds {
            replayer.fail_kind(kind);
        }
        replayer
    }

    pub fn fail_kind(&self, kind: &str) {
        self.failing.borrow_mut().insert(kind.to_string());
    }

    pub fn succeed_kind(&self, kind: &str) {
        self.failing.borrow_mut().remove(kind);
    }

    /// Las próximas `n` llamadas fallan sea cual sea el `kind`
    pub fn fail_next(&self, n: usize) {
        self.fail_next.set(n);
    }

    /// `kind` de cada llamada, en orden
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(kind, _)| kind.clone()).collect()
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.calls.borrow().iter().map(|(_, payload)| payload.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Replayer for ScriptedReplayer {
    fn replay<'a>(
        &'a self,
        kind: &'a str,
        payload: &'a serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<(), ReplayError>> {
        self.calls.borrow_mut().push((kind.to_string(), payload.clone()));
        let forced = self.fail_next.get();
        let result = if forced > 0 {
            self.fail_next.set(forced - 1);
            Err(ReplayError::Offline)
        } else if self.failing.borrow().contains(kind) {
            Err(ReplayError::Transport(kind.to_string()))
        } else {
            Ok(())
        };
        Box::pin(futures::future::ready(result))
    }
}

/// Replayer cuyas llamadas quedan suspendidas hasta que el test las resuelve
#[derive(Default)]
pub struct ManualReplayer {
    waiting: RefCell<VecDeque<oneshot::Sender<Result<(), ReplayError>>>>,
    calls: RefCell<Vec<String>>,
}

impl ManualReplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.waiting.borrow().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Resuelve la llamada más antigua. Devuelve `false` si no había ninguna.
    pub fn resolve_next(&self, result: Result<(), ReplayError>) -> bool {
        let sender = self.waiting.borrow_mut().pop_front();
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

impl Replayer for ManualReplayer {
    fn replay<'a>(
        &'a self,
        kind: &'a str,
        _payload: &'a serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<(), ReplayError>> {
        self.calls.borrow_mut().push(kind.to_string());
        let (sender, receiver) = oneshot::channel();
        self.waiting.borrow_mut().push_back(sender);
        Box::pin(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(ReplayError::Transport("replay abandonado".to_string())))
        })
    }
}
