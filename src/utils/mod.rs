// Utils compartidos

pub mod clock;
pub mod constants;
pub mod spawn;
pub mod storage;
pub mod timers;

pub use clock::*;
pub use constants::*;
pub use spawn::*;
pub use storage::*;
pub use timers::*;
