use chrono::{DateTime, Utc};

/// Fuente de tiempo de la capa de resiliencia
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Reloj real (`Date.now()` en wasm vía chrono `wasmbind`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
