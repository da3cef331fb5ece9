#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod kitchen;
pub mod pickup;
pub mod pod;
pub mod runner;
pub mod telemetry;
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the service surface at the crate root for convenience
pub use crate::config::Config;
pub use crate::core::{Order, OrderState, Shelf, Temperature};
pub use crate::pod::{AddResult, ShelfPod, ShelfPodObserver, ShelfSetError};
