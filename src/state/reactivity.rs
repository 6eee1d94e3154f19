// ============================================================================
// REACTIVITY - Listas de subscribers (patrón observer, sin framework de UI)
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Identificador devuelto por `subscribe`, necesario para `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Rc<dyn Fn(&T)>;

/// Lista ordenada de listeners. Se notifican en orden de registro.
pub struct Observers<T> {
    listeners: RefCell<Vec<(SubscriptionId, Listener<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Devuelve `false` si la suscripción ya no existía
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Notificar a todos los subscribers.
    ///
    /// Trabaja sobre una copia de la lista: un listener puede suscribir o
    /// desuscribir durante la notificación. Los desuscritos en mitad de la
    /// ronda ya no reciben el valor.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<(SubscriptionId, Listener<T>)> = self.listeners.borrow().clone();
        for (id, listener) in snapshot {
            let still_subscribed = self
                .listeners
                .borrow()
                .iter()
                .any(|(existing, _)| *existing == id);
            if still_subscribed {
                listener(value);
            }
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}
