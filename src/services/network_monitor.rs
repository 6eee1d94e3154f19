// ============================================================================
// MONITOR DE ESTADO DE RED
// ============================================================================
// Única fuente de verdad online/offline. Solo cambia por señales del entorno
// (eventos `online`/`offline` del navegador) y notifica cada transición una
// vez, en el orden de registro de los subscribers.
// ============================================================================

use std::cell::Cell;

use crate::models::ConnectivityState;
use crate::state::{Observers, SubscriptionId};

pub struct ConnectivityMonitor {
    state: Cell<ConnectivityState>,
    observers: Observers<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        Self {
            state: Cell::new(initial),
            observers: Observers::new(),
        }
    }

    /// Obtener estado actual de red
    pub fn current_state(&self) -> ConnectivityState {
        self.state.get()
    }

    pub fn is_online(&self) -> bool {
        self.current_state().is_online()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(ConnectivityState) + 'static,
    {
        self.observers.subscribe(move |state: &ConnectivityState| listener(*state))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Aplica una señal del entorno. Las señales redundantes (mismo estado)
    /// se ignoran. Devuelve `true` si hubo transición.
    pub fn apply_signal(&self, signal: ConnectivityState) -> bool {
        if self.state.get() == signal {
            log::debug!("🌐 Señal de red redundante ignorada: {:?}", signal);
            return false;
        }
        self.state.set(signal);
        match signal {
            ConnectivityState::Online => log::info!("🌐 Network: ONLINE"),
            ConnectivityState::Offline => log::warn!("📴 Network: OFFLINE"),
        }
        self.observers.notify(&signal);
        true
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

// ============================================================================
// SEÑAL DEL NAVEGADOR
// ============================================================================

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserNetworkSignal;

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use web_sys::{window, Event};

    use super::ConnectivityMonitor;
    use crate::models::ConnectivityState;

    thread_local! {
        // Un único monitor por página, conectado una sola vez a window
        static PAGE_MONITOR: RefCell<Option<Rc<ConnectivityMonitor>>> = RefCell::new(None);
    }

    /// Puente entre los eventos `online`/`offline` de window y el monitor
    pub struct BrowserNetworkSignal;

    impl BrowserNetworkSignal {
        /// Estado inicial según `navigator.onLine` (online si no se puede leer)
        pub fn initial_state() -> ConnectivityState {
            let on_line = window()
                .and_then(|win| js_sys::Reflect::get(&win, &JsValue::from_str("navigator")).ok())
                .and_then(|nav| js_sys::Reflect::get(&nav, &JsValue::from_str("onLine")).ok())
                .and_then(|v| v.as_bool());
            ConnectivityState::from_online(on_line.unwrap_or(true))
        }

        /// Monitor de la página. La primera llamada lo crea con el estado de
        /// `navigator.onLine` y registra los listeners de window; las
        /// siguientes devuelven la misma instancia.
        pub fn monitor() -> Rc<ConnectivityMonitor> {
            if let Some(existing) = PAGE_MONITOR.with(|cell| cell.borrow().clone()) {
                return existing;
            }

            let monitor = Rc::new(ConnectivityMonitor::new(Self::initial_state()));
            PAGE_MONITOR.with(|cell| *cell.borrow_mut() = Some(monitor.clone()));
            Self::attach_listeners();
            monitor
        }

        fn attach_listeners() {
            let Some(win) = window() else {
                log::warn!("⚠️ BrowserNetworkSignal: sin window, estado de red fijo");
                return;
            };

            let online = Self::listener(ConnectivityState::Online);
            let offline = Self::listener(ConnectivityState::Offline);
            let registered = win
                .add_event_listener_with_callback("online", online.as_ref().unchecked_ref())
                .and_then(|_| {
                    let callback = offline.as_ref().unchecked_ref();
                    win.add_event_listener_with_callback("offline", callback)
                });

            // Listeners globales: viven toda la vida de la página
            online.forget();
            offline.forget();

            match registered {
                Ok(()) => log::info!("✅ BrowserNetworkSignal: listeners registrados"),
                Err(e) => log::error!("❌ BrowserNetworkSignal: no se pudo registrar: {:?}", e),
            }
        }

        fn listener(state: ConnectivityState) -> Closure<dyn FnMut(Event)> {
            Closure::wrap(Box::new(move |_event: Event| {
                if let Some(monitor) = PAGE_MONITOR.with(|cell| cell.borrow().clone()) {
                    monitor.apply_signal(state);
                }
            }) as Box<dyn FnMut(Event)>)
        }
    }
}
