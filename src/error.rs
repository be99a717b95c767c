//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;
use crate::protocol::ProtocolError;
use crate::token_space::TokenSpaceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("llm error: {0}")]
    Llm(#[from] ProviderError),

    #[error("context error: {0}")]
    Context(String),

    #[error("token space error: {0}")]
    TokenSpace(#[from] TokenSpaceError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("tree error: {0}")]
    Tree(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
