use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus disconnected: no peer left to answer")]
    Disconnected,
    #[error("bus io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bus interface '{0}' not available")]
    Interface(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
