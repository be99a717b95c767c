// Library root. The binary entry point is src/main.rs.

pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod logger;
pub mod protocol;
pub mod runtime;
pub mod token_space;
pub mod utils;
