// ============================================================================
// BORRADORES DE FORMULARIOS (DEBOUNCE + PERSISTENCIA)
// ============================================================================
// Cada edición reinicia un temporizador por formulario; solo se persiste
// cuando pasa `interval` sin cambios nuevos. Un borrador por `form_id`,
// reemplazado (no fusionado) por cada guardado.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::ResilienceConfig;
use crate::models::{Draft, DraftEvent};
use crate::state::{Observers, SubscriptionId};
use crate::utils::constants::DRAFT_TIMESTAMP_SUFFIX;
use crate::utils::{load_json, save_json, Clock, KeyValueStore, StorageError, TimerHandle, Timers};

struct PendingSave {
    generation: u64,
    data: serde_json::Value,
    // Soltarlo cancela el temporizador
    _timer: TimerHandle,
}

struct DraftShared {
    storage: Rc<dyn KeyValueStore>,
    clock: Rc<dyn Clock>,
    timers: Rc<dyn Timers>,
    interval: Duration,
    key_prefix: String,
    pending: RefCell<HashMap<String, PendingSave>>,
    // None = borrado en esta sesión (aunque el almacenamiento no lo refleje)
    session: RefCell<HashMap<String, Option<Draft>>>,
    next_generation: Cell<u64>,
    degraded: Cell<bool>,
    observers: Observers<DraftEvent>,
}

pub struct DraftStore {
    shared: Rc<DraftShared>,
}

impl DraftStore {
    pub fn new(
        storage: Rc<dyn KeyValueStore>,
        clock: Rc<dyn Clock>,
        timers: Rc<dyn Timers>,
        config: &ResilienceConfig,
    ) -> Self {
        Self {
            shared: Rc::new(DraftShared {
                storage,
                clock,
                timers,
                interval: config.draft_debounce(),
                key_prefix: config.draft_key_prefix.clone(),
                pending: RefCell::new(HashMap::new()),
                session: RefCell::new(HashMap::new()),
                next_generation: Cell::new(0),
                degraded: Cell::new(false),
                observers: Observers::new(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Llamar en cada edición. El guardado se confirma tras `interval` sin
    /// más cambios para el mismo formulario, con los datos más recientes.
    pub fn record_change(&self, form_id: &str, data: serde_json::Value) {
        let shared = &self.shared;
        let generation = shared.next_generation.get();
        shared.next_generation.set(generation + 1);

        let weak = Rc::downgrade(shared);
        let key = form_id.to_string();
        let timer = shared.timers.schedule(
            shared.interval,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.commit_if_current(&key, generation);
                }
            }),
        );

        // Reemplaza el guardado programado anterior y cancela su temporizador
        let superseded = shared.pending.borrow_mut().insert(
            form_id.to_string(),
            PendingSave {
                generation,
                data,
                _timer: timer,
            },
        );
        drop(superseded);
    }

    /// Variante tipada. Un fallo de serialización solo se registra.
    pub fn record_change_as<T: Serialize>(&self, form_id: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(data) => self.record_change(form_id, data),
            Err(e) => log::warn!("⚠️ Borrador '{}' no serializable, se ignora: {}", form_id, e),
        }
    }

    /// Último guardado confirmado
    pub fn get_draft(&self, form_id: &str) -> Option<Draft> {
        if let Some(entry) = self.shared.session.borrow().get(form_id) {
            return entry.clone();
        }
        self.shared.read_persisted(form_id)
    }

    pub fn get_draft_as<T: DeserializeOwned>(&self, form_id: &str) -> Option<T> {
        let draft = self.get_draft(form_id)?;
        match serde_json::from_value(draft.data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("⚠️ Borrador '{}' no coincide con el tipo esperado: {}", form_id, e);
                None
            }
        }
    }

    pub fn has_draft(&self, form_id: &str) -> bool {
        self.get_draft(form_id).is_some()
    }

    pub fn has_pending_save(&self, form_id: &str) -> bool {
        self.shared.pending.borrow().contains_key(form_id)
    }

    /// Datos para restaurar el formulario. El borrador se conserva hasta el
    /// envío o el descarte, así que una recarga durante la recuperación no
    /// lo pierde.
    pub fn recover(&self, form_id: &str) -> Option<serde_json::Value> {
        let draft = self.get_draft(form_id)?;
        log::info!("📋 Borrador '{}' recuperado (guardado {})", form_id, draft.saved_at);
        Some(draft.data)
    }

    /// El usuario descarta el borrador ofrecido
    pub fn dismiss(&self, form_id: &str) {
        self.clear_draft(form_id);
    }

    /// Tras un envío correcto o un descarte. Cancela también un guardado
    /// programado para que el borrador no reaparezca.
    pub fn clear_draft(&self, form_id: &str) {
        let shared = &self.shared;
        shared.pending.borrow_mut().remove(form_id);

        for key in [shared.data_key(form_id), shared.timestamp_key(form_id)] {
            if let Err(e) = shared.storage.remove(&key) {
                log::warn!("⚠️ No se pudo eliminar '{}': {}", key, e);
            }
        }
        shared.session.borrow_mut().insert(form_id.to_string(), None);

        log::info!("🗑️ Borrador '{}' eliminado", form_id);
        shared.observers.notify(&DraftEvent::Cleared {
            form_id: form_id.to_string(),
        });
    }

    /// Confirma ya el guardado pendiente de un formulario (p. ej. `pagehide`)
    pub fn flush(&self, form_id: &str) -> bool {
        let pending = self.shared.pending.borrow_mut().remove(form_id);
        match pending {
            Some(save) => {
                self.shared.commit(form_id, save.data);
                true
            }
            None => false,
        }
    }

    pub fn flush_all(&self) -> usize {
        let mut drained: Vec<(String, PendingSave)> =
            self.shared.pending.borrow_mut().drain().collect();
        drained.sort_by_key(|(_, save)| save.generation);
        let count = drained.len();
        for (form_id, save) in drained {
            self.shared.commit(&form_id, save.data);
        }
        count
    }

    pub fn is_persistence_degraded(&self) -> bool {
        self.shared.degraded.get()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&DraftEvent) + 'static,
    {
        self.shared.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.observers.unsubscribe(id)
    }
}

impl DraftShared {
    fn data_key(&self, form_id: &str) -> String {
        format!("{}{}", self.key_prefix, form_id)
    }

    fn timestamp_key(&self, form_id: &str) -> String {
        format!("{}{}{}", self.key_prefix, form_id, DRAFT_TIMESTAMP_SUFFIX)
    }

    fn commit_if_current(&self, form_id: &str, generation: u64) {
        let save = {
            let mut pending = self.pending.borrow_mut();
            let is_current = pending
                .get(form_id)
                .map_or(false, |save| save.generation == generation);
            if is_current {
                pending.remove(form_id)
            } else {
                None
            }
        };
        if let Some(save) = save {
            self.commit(form_id, save.data);
        }
    }

    fn commit(&self, form_id: &str, data: serde_json::Value) {
        let draft = Draft {
            form_id: form_id.to_string(),
            data,
            saved_at: self.clock.now(),
        };

        match self.write(&draft) {
            Ok(()) => {
                if self.degraded.replace(false) {
                    log::info!("💾 Persistencia de borradores recuperada");
                }
                log::debug!("💾 Borrador '{}' guardado", form_id);
            }
            Err(e) => {
                // Nunca interrumpe la edición: queda en memoria para esta sesión
                self.degraded.set(true);
                log::warn!("⚠️ No se pudo persistir el borrador '{}': {}", form_id, e);
            }
        }

        let saved_at = draft.saved_at;
        self.session.borrow_mut().insert(form_id.to_string(), Some(draft));
        self.observers.notify(&DraftEvent::Saved {
            form_id: form_id.to_string(),
            saved_at,
        });
    }

    /// Datos primero, timestamp después. Si falla cualquiera de las dos
    /// escrituras el par persistido sigue siendo el del guardado anterior.
    fn write(&self, draft: &Draft) -> Result<(), StorageError> {
        let data_key = self.data_key(&draft.form_id);
        let previous = self.storage.get(&data_key)?;

        save_json(self.storage.as_ref(), &data_key, &draft.data)?;

        let stamped = self
            .storage
            .set(&self.timestamp_key(&draft.form_id), &draft.saved_at.to_rfc3339());
        if let Err(e) = stamped {
            let restored = match previous {
                Some(raw) => self.storage.set(&data_key, &raw),
                None => self.storage.remove(&data_key),
            };
            if let Err(restore_err) = restored {
                log::error!(
                    "❌ Borrador '{}' a medio escribir, no se pudo restaurar: {}",
                    draft.form_id,
                    restore_err
                );
            }
            return Err(e);
        }
        Ok(())
    }

    fn read_persisted(&self, form_id: &str) -> Option<Draft> {
        let stored = load_json::<serde_json::Value>(self.storage.as_ref(), &self.data_key(form_id));
        let data = match stored {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("⚠️ Borrador '{}' ilegible: {}", form_id, e);
                return None;
            }
        };

        let saved_at = self
            .storage
            .get(&self.timestamp_key(form_id))
            .ok()
            .flatten()
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        match saved_at {
            Some(saved_at) => Some(Draft {
                form_id: form_id.to_string(),
                data,
                saved_at,
            }),
            None => {
                log::warn!("⚠️ Borrador '{}' sin timestamp válido, se ignora", form_id);
                None
            }
        }
    }
}
