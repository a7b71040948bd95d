use thiserror::Error;

use crate::matrix::MatrixError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SocError {
    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("bus error: {0}")]
    Bus(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
