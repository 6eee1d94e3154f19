use std::time::Duration;

/// Programa una llamada diferida de un solo disparo.
///
/// Soltar el `TimerHandle` devuelto cancela la llamada si aún no ha
/// disparado.
pub trait Timers {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;
}

/// Cancela su temporizador al hacer drop
#[must_use = "soltar el handle cancela el temporizador"]
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancela ya, sin esperar al drop
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserTimers;

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::time::Duration;

    use gloo_timers::callback::Timeout;

    use super::{TimerHandle, Timers};

    /// `setTimeout` del navegador
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserTimers;

    impl Timers for BrowserTimers {
        fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
            let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
            let timeout = Timeout::new(millis, callback);
            // Drop de Timeout = clearTimeout + liberar el closure
            TimerHandle::new(move || drop(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn dropping_or_cancelling_runs_cancel_once() {
        let cancelled = Rc::new(Cell::new(0));
        {
            let cancelled = cancelled.clone();
            let _handle = TimerHandle::new(move || cancelled.set(cancelled.get() + 1));
        }
        assert_eq!(cancelled.get(), 1);

        let handle = {
            let cancelled = cancelled.clone();
            TimerHandle::new(move || cancelled.set(cancelled.get() + 1))
        };
        handle.cancel();
        assert_eq!(cancelled.get(), 2);
    }
}
