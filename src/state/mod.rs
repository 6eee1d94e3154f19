// State Management con Rc<RefCell>

pub mod reactivity;

pub use reactivity::{Observers, SubscriptionId};
