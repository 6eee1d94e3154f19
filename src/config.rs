use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_DRAFT_DEBOUNCE_MS, DEFAULT_DRAFT_KEY_PREFIX, DEFAULT_MAX_RETRIES,
    DEFAULT_QUEUE_STORAGE_KEY,
};

/// Política de orden al drenar la cola de acciones pendientes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Una acción que no se aplica detiene el drenado: nada la adelanta
    #[default]
    Strict,
    /// Las acciones son independientes: las fallidas se saltan
    Independent,
}

impl OrderingPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(OrderingPolicy::Strict),
            "independent" => Some(OrderingPolicy::Independent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub draft_debounce_ms: u32,
    pub default_max_retries: u32,
    pub queue_storage_key: String,
    pub draft_key_prefix: String,
    pub ordering: OrderingPolicy,
    pub enable_logging: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            draft_debounce_ms: DEFAULT_DRAFT_DEBOUNCE_MS,
            default_max_retries: DEFAULT_MAX_RETRIES,
            queue_storage_key: DEFAULT_QUEUE_STORAGE_KEY.to_string(),
            draft_key_prefix: DEFAULT_DRAFT_KEY_PREFIX.to_string(),
            ordering: OrderingPolicy::Strict,
            enable_logging: true,
        }
    }
}

impl ResilienceConfig {
    /// Carga la configuración desde variables de entorno en tiempo de compilación
    pub fn from_env() -> Self {
        Self::from_values(
            option_env!("DRAFT_DEBOUNCE_MS"),
            option_env!("PENDING_MAX_RETRIES"),
            option_env!("QUEUE_STORAGE_KEY"),
            option_env!("DRAFT_KEY_PREFIX"),
            option_env!("QUEUE_ORDERING"),
            option_env!("ENABLE_LOGGING"),
        )
    }

    fn from_values(
        debounce_ms: Option<&str>,
        max_retries: Option<&str>,
        queue_key: Option<&str>,
        draft_prefix: Option<&str>,
        ordering: Option<&str>,
        enable_logging: Option<&str>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            draft_debounce_ms: debounce_ms
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.draft_debounce_ms),
            default_max_retries: max_retries
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.default_max_retries),
            queue_storage_key: queue_key
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.queue_storage_key),
            draft_key_prefix: draft_prefix
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.draft_key_prefix),
            ordering: ordering
                .and_then(OrderingPolicy::parse)
                .unwrap_or(defaults.ordering),
            enable_logging: enable_logging
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.enable_logging),
        }
    }

    pub fn draft_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.draft_debounce_ms))
    }

    /// Verifica si el modo de logging está habilitado
    pub fn is_logging_enabled(&self) -> bool {
        self.enable_logging
    }
}

// Configuración global estática
lazy_static::lazy_static! {
    pub static ref CONFIG: ResilienceConfig = ResilienceConfig::from_env();
}
