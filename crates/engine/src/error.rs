// In crates/engine/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Session {0} not found")]
    SessionNotFound(i64),

    #[error(transparent)]
    Store(#[from] database::Error),

    #[error("Order execution failed: {0}")]
    Execution(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
