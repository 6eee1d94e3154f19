pub mod connectivity;
pub mod draft;
pub mod outcome;
pub mod pending_action;

pub use connectivity::*;
pub use draft::*;
pub use outcome::*;
pub use pending_action::*;
