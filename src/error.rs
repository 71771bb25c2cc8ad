use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
