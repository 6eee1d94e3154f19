// ============================================================================
// ALMACENAMIENTO CLAVE-VALOR DURABLE
// ============================================================================
// localStorage en el navegador, memoria como fallback (modo privado, tests)
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("almacenamiento no disponible: {0}")]
    Unavailable(String),
    #[error("cuota de almacenamiento excedida al escribir '{key}'")]
    QuotaExceeded { key: String },
    #[error("error escribiendo '{key}': {reason}")]
    Write { key: String, reason: String },
    #[error("error leyendo '{key}': {reason}")]
    Read { key: String, reason: String },
    #[error("error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Superficie mínima de persistencia: get/set/remove síncronos por clave
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value)?;
    store.set(key, &json)
}

pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

// ============================================================================
// MEMORIA
// ============================================================================

/// Almacenamiento en memoria. Sobrevive a la reconstrucción de la cola o del
/// store de borradores si se comparte el mismo `Rc`, no a una recarga real.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
    writes: Cell<usize>,
    writes_per_key: RefCell<HashMap<String, usize>>,
    fail_writes: Cell<bool>,
    quota_bytes: Cell<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simula una cuota (bytes de claves + valores)
    pub fn with_quota(quota_bytes: usize) -> Self {
        let store = Self::default();
        store.quota_bytes.set(Some(quota_bytes));
        store
    }

    /// Número de escrituras (`set`) completadas
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Escrituras completadas sobre una clave concreta
    pub fn writes_for(&self, key: &str) -> usize {
        self.writes_per_key.borrow().get(key).copied().unwrap_or(0)
    }

    /// Hace fallar todas las escrituras siguientes
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn used_bytes_with(&self, key: &str, value: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
            + key.len()
            + value.len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "escrituras deshabilitadas".to_string(),
            });
        }
        if let Some(quota) = self.quota_bytes.get() {
            if self.used_bytes_with(key, value) > quota {
                return Err(StorageError::QuotaExceeded { key: key.to_string() });
            }
        }
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        self.writes.set(self.writes.get() + 1);
        *self.writes_per_key.borrow_mut().entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

// ============================================================================
// LOCALSTORAGE (navegador)
// ============================================================================

#[cfg(target_arch = "wasm32")]
pub use browser::{open_default_storage, LocalStorageStore};

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::rc::Rc;

    use wasm_bindgen::JsValue;
    use web_sys::{window, Storage};

    use super::{KeyValueStore, MemoryStore, StorageError};

    pub struct LocalStorageStore {
        storage: Storage,
    }

    impl LocalStorageStore {
        pub fn open() -> Result<Self, StorageError> {
            let storage = window()
                .and_then(|w| w.local_storage().ok())
                .flatten()
                .ok_or_else(|| {
                    StorageError::Unavailable("No se pudo acceder a localStorage".to_string())
                })?;
            Ok(Self { storage })
        }
    }

    fn is_quota_error(err: &JsValue) -> bool {
        js_sys::Reflect::get(err, &JsValue::from_str("name"))
            .ok()
            .and_then(|name| name.as_string())
            .map(|name| name == "QuotaExceededError" || name == "NS_ERROR_DOM_QUOTA_REACHED")
            .unwrap_or(false)
    }

    impl KeyValueStore for LocalStorageStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.storage.get_item(key).map_err(|e| StorageError::Read {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.storage.set_item(key, value).map_err(|e| {
                if is_quota_error(&e) {
                    StorageError::QuotaExceeded { key: key.to_string() }
                } else {
                    StorageError::Write {
                        key: key.to_string(),
                        reason: format!("{:?}", e),
                    }
                }
            })
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.storage.remove_item(key).map_err(|e| StorageError::Write {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })
        }
    }

    /// localStorage si está disponible; si no, memoria para esta sesión
    pub fn open_default_storage() -> Rc<dyn KeyValueStore> {
        match LocalStorageStore::open() {
            Ok(store) => Rc::new(store),
            Err(e) => {
                log::warn!("⚠️ {} - usando almacenamiento en memoria", e);
                Rc::new(MemoryStore::new())
            }
        }
    }
}
