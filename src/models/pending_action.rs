use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::constants::QUEUE_FORMAT_VERSION;

/// Identificador único de una acción pendiente
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn generate() -> Self {
        ActionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        ActionId(value.to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Retrying,
    Failed,
}

/// Operación de escritura diferida. `kind` y `payload` son opacos: solo el
/// replayer que la reproduce los interpreta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    /// Posición FIFO, asignada en orden de creación
    pub sequence: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: ActionStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl PendingAction {
    pub fn new(
        sequence: u64,
        kind: impl Into<String>,
        payload: serde_json::Value,
        max_retries: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActionId::generate(),
            sequence,
            kind: kind.into(),
            payload,
            created_at,
            retry_count: 0,
            max_retries,
            status: ActionStatus::Pending,
            last_error: None,
            last_attempt_at: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ActionStatus::Failed
    }

    pub fn is_replayable(&self) -> bool {
        matches!(self.status, ActionStatus::Pending | ActionStatus::Retrying)
    }

    /// Registra un intento fallido. Devuelve `true` si agotó los reintentos.
    pub fn record_failure(&mut self, error: String, at: DateTime<Utc>) -> bool {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.last_error = Some(error);
        self.last_attempt_at = Some(at);
        if self.retry_count >= self.max_retries {
            self.status = ActionStatus::Failed;
            true
        } else {
            self.status = ActionStatus::Retrying;
            false
        }
    }

    /// Reinicio manual antes de un reintento explícito del usuario
    pub fn reset_for_manual_retry(&mut self) {
        self.retry_count = 0;
        self.status = ActionStatus::Retrying;
    }

    /// Repara entradas persistidas que violan `retry_count <= max_retries`
    pub(crate) fn normalize(&mut self) {
        if self.retry_count >= self.max_retries {
            self.retry_count = self.max_retries;
            self.status = ActionStatus::Failed;
        }
    }
}

/// Sobre persistido bajo la clave de la cola
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedQueue {
    pub version: u32,
    pub actions: Vec<PendingAction>,
}

impl PersistedQueue {
    pub fn new(actions: Vec<PendingAction>) -> Self {
        Self {
            version: QUEUE_FORMAT_VERSION,
            actions,
        }
    }
}
