// ============================================================================
// ASSESSMENT RESILIENCE - CAPA OFFLINE DEL DASHBOARD (RUST PURO)
// ============================================================================
// - Services: monitor de red, cola de acciones pendientes, borradores
// - ViewModels: fachada para la capa de presentación
// - State: observadores con Rc<RefCell>
// - Models: estructuras persistidas y resultados
// ============================================================================

pub mod config;
pub mod models;
pub mod services;
pub mod state;
pub mod testing;
pub mod utils;
pub mod viewmodels;

pub use config::{OrderingPolicy, ResilienceConfig, CONFIG};
pub use models::{
    ActionId, ActionStatus, ConnectivityState, Draft, DraftEvent, DrainReport, DrainSkip,
    PendingAction, PerformOutcome, QueueSnapshot, ReplayError, RetryOutcome,
};
pub use services::{ConnectivityMonitor, DraftStore, PendingActionQueue, Replayer};
pub use state::SubscriptionId;
pub use utils::{
    Clock, KeyValueStore, MemoryStore, Spawner, StorageError, SystemClock, TimerHandle, Timers,
};
pub use viewmodels::{BuildError, ResilienceBuilder, ResilienceViewModel};

/// Inicializa panic hook y logging en el navegador. Llamar una vez al
/// arrancar la app, antes de construir la fachada.
#[cfg(target_arch = "wasm32")]
pub fn init_logging() {
    console_error_panic_hook::set_once();

    if CONFIG.is_logging_enabled() {
        wasm_logger::init(wasm_logger::Config::default());
        log::info!("🚀 Capa de resiliencia offline inicializada");
    }
}
