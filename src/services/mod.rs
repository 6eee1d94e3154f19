pub mod draft_store;
pub mod network_monitor;
pub mod pending_queue;
pub mod replayer;

pub use draft_store::*;
pub use network_monitor::*;
pub use pending_queue::*;
pub use replayer::*;
