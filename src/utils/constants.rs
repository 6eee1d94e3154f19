/// Debounce por defecto de los borradores (ms)
pub const DEFAULT_DRAFT_DEBOUNCE_MS: u32 = 2000;

/// Reintentos por defecto de una acción pendiente
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Clave con la lista completa de acciones pendientes
pub const DEFAULT_QUEUE_STORAGE_KEY: &str = "pending_actions_queue";

/// Prefijo de las claves de borrador (`draft-{form_id}`)
pub const DEFAULT_DRAFT_KEY_PREFIX: &str = "draft-";

/// Sufijo de la clave de timestamp asociada a cada borrador
pub const DRAFT_TIMESTAMP_SUFFIX: &str = "-timestamp";

/// Versión del sobre persistido de la cola
pub const QUEUE_FORMAT_VERSION: u32 = 1;
