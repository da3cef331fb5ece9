use thiserror::Error;

use crate::config::ConfigError;
use crate::kitchen::IntakeError;
use crate::pod::ShelfSetError;

/// Crate-level convenience error: a thin wrapper over the per-concern
/// errors. Pod operations themselves never error; full shelves and expired
/// orders are answered through `AddResult` and order state.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    ShelfSet(#[from] ShelfSetError),
}
