use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pending_action::{ActionId, ActionStatus};

/// Fallo al reproducir una acción. Nunca sale de la cola: se convierte en
/// un reintento y queda registrado en `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("sin conexión")]
    Offline,
    #[error("rechazado por el servidor (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("error de red: {0}")]
    Transport(String),
}

/// Motivo por el que un drenado no se ejecutó
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainSkip {
    AlreadyRunning,
    Offline,
}

/// Resultado de un drenado de la cola
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Reproducidas con éxito y eliminadas, en orden
    pub succeeded: Vec<ActionId>,
    /// Intentadas sin éxito en este drenado (RETRYING o FAILED)
    pub failed: Vec<ActionId>,
    /// Subconjunto de `failed` que agotó sus reintentos
    pub exhausted: Vec<ActionId>,
    /// Entrada que detuvo el drenado (política estricta)
    pub blocked_by: Option<ActionId>,
    pub skipped: Option<DrainSkip>,
}

impl DrainReport {
    pub fn skipped(reason: DrainSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Resultado de un reintento manual (`retry_one`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded,
    Failed { status: ActionStatus, error: String },
    NotFound,
    /// Solo las entradas FAILED admiten reintento manual
    NotFailed(ActionStatus),
    /// Hay un drenado en curso
    Busy,
}

/// Resultado de intentar una mutación a través de la fachada
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerformOutcome {
    Applied,
    Queued(ActionId),
}

/// Proyección de la cola para la capa de presentación
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub failed: usize,
    pub draining: bool,
}
