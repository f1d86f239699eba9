//! Token handshake with the collector.
//!
//! The client sends a login request carrying either a pre-issued token or a
//! login/password pair. The collector answers with the two-byte [`HEADER`]
//! followed by a `u16` length and the token bytes.

use std::io::{Read, Write};

use super::{config::Credentials, error::ProtocolError};

/// Magic bytes opening every frame in both directions.
pub const HEADER: [u8; 2] = [0xCA, 0xFE];
/// Opcode of the login request.
pub const OP_TOKEN_REQUEST: u8 = 0x01;
/// Tokens shorter than this are treated as absent.
pub const MIN_TOKEN_LEN: usize = 15;

const MODE_LOGIN: u8 = 0;
const MODE_TOKEN: u8 = 1;

/// Whether a cached token is too short to be used.
pub fn needs_handshake(token: &[u8]) -> bool {
    token.len() < MIN_TOKEN_LEN
}

fn put_str(buf: &mut Vec<u8>, value: &str, what: &'static str) -> Result<(), ProtocolError> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::CredentialTooLong(what))?;
    buf.extend(len.to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Encode the login request for `credentials`.
pub fn token_request(credentials: &Credentials) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(64);
    buf.extend(HEADER);
    buf.push(OP_TOKEN_REQUEST);
    if credentials.token.is_empty() {
        buf.push(MODE_LOGIN);
        put_str(&mut buf, &credentials.login, "login")?;
        put_str(&mut buf, &credentials.password, "password")?;
    } else {
        buf.push(MODE_TOKEN);
        put_str(&mut buf, &credentials.token, "token")?;
    }
    Ok(buf)
}

/// Run the handshake over `stream` and return the issued token.
///
/// Never retries: a wrong header fails with [`ProtocolError::BadHeader`] and
/// the caller decides whether to reconnect.
pub fn perform<S: Read + Write>(
    stream: &mut S,
    credentials: &Credentials,
) -> Result<Vec<u8>, ProtocolError> {
    stream.write_all(&token_request(credentials)?)?;
    stream.flush()?;

    let mut header = [0u8; 2];
    stream.read_exact(&mut header)?;
    if header != HEADER {
        return Err(ProtocolError::BadHeader {
            expected: HEADER,
            actual: header,
        });
    }

    let mut len = [0u8; 2];
    stream.read_exact(&mut len)?;
    let len = usize::from(u16::from_be_bytes(len));
    if len == 0 {
        return Err(ProtocolError::EmptyToken);
    }
    let mut token = vec![0u8; len];
    stream.read_exact(&mut token)?;
    Ok(token)
}
