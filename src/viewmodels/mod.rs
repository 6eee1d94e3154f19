pub mod resilience_viewmodel;

pub use resilience_viewmodel::{BuildError, ResilienceBuilder, ResilienceViewModel};
