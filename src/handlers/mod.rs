//! Handler builders and associated traits.
//!
//! Provides a minimal builder API for constructing appenders in a
//! type‑safe manner. Each builder implements [`HandlerBuilderTrait`]
//! which returns a boxed [`LogdocHandler`] ready to be shared with
//! producers.

use thiserror::Error;

use crate::handler::{LogdocHandler, StartError};

pub mod tcp_builder;

pub use tcp_builder::LogdocAppenderBuilder;

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    /// The appender could not be started.
    #[error(transparent)]
    Start(#[from] StartError),
}

/// Trait implemented by all handler builders.
///
/// Builders return boxed [`LogdocHandler`] objects so the caller can
/// install them without knowing the concrete handler type.
pub trait HandlerBuilderTrait: Send + Sync {
    /// Build the handler instance.
    fn build(&self) -> Result<Box<dyn LogdocHandler>, HandlerBuildError>;
}
