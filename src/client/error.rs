use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection is not open")]
    NotOpen,

    #[error("Gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}
