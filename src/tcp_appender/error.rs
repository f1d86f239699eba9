//! Error types raised inside the delivery worker.

use std::io;

use thiserror::Error;

use super::cancel::Cancelled;

/// Failures of the token handshake.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The collector answered with an unexpected header.
    #[error("wrong header: expected {expected:02x?}, got {actual:02x?}")]
    BadHeader { expected: [u8; 2], actual: [u8; 2] },
    /// The collector issued a zero-length token.
    #[error("collector issued an empty token")]
    EmptyToken,
    /// A credential does not fit the `u16` length prefix.
    #[error("{0} is too long for the login request")]
    CredentialTooLong(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures while establishing a ready connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Failures while encoding a frame.
///
/// Encoding the same record again fails the same way, so the worker abandons
/// the record instead of requeueing it.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame body of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("token of {0} bytes does not fit the frame header")]
    TokenTooLong(usize),
    #[error("failed to encode frame body: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Failures that abort a draining pass.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("no ready connection")]
    NotConnected,
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}
