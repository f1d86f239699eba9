//! Frame decoding used by the unit tests to inspect what reached the wire.

use std::io::{self, Read};

use serde::Deserialize;

use super::{
    handshake::HEADER,
    serialise::{OP_PARTIAL_ENTRY, PartInfo},
};

#[derive(Debug, Deserialize)]
pub(crate) struct Entry {
    pub time: Option<i64>,
    pub source: Option<String>,
    pub level: Option<String>,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug)]
pub(crate) struct DecodedFrame {
    pub opcode: u8,
    pub token: Vec<u8>,
    pub part: Option<PartInfo>,
    pub entry: Entry,
}

fn take<const N: usize>(reader: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn take_vec(reader: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read one log frame, failing on a bad header or undecodable body.
pub(crate) fn read_frame(reader: &mut impl Read) -> io::Result<DecodedFrame> {
    if take::<2>(reader)? != HEADER {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad frame header"));
    }
    let [opcode] = take::<1>(reader)?;
    let token_len = usize::from(u16::from_be_bytes(take(reader)?));
    let token = take_vec(reader, token_len)?;
    let part = if opcode == OP_PARTIAL_ENTRY {
        Some(PartInfo {
            partial_id: take(reader)?,
            index: u32::from_be_bytes(take(reader)?) as usize,
            total_parts: u32::from_be_bytes(take(reader)?) as usize,
            total_size_tokens: i32::from_be_bytes(take(reader)?),
        })
    } else {
        None
    };
    let body_len = u32::from_be_bytes(take(reader)?) as usize;
    let body = take_vec(reader, body_len)?;
    let entry = rmp_serde::from_slice(&body).map_err(io::Error::other)?;
    Ok(DecodedFrame {
        opcode,
        token,
        part,
        entry,
    })
}

/// Split a byte buffer into frames, panicking on malformed input.
pub(crate) fn decode_frames(mut bytes: &[u8]) -> Vec<DecodedFrame> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        frames.push(read_frame(&mut bytes).expect("well-formed frame"));
    }
    frames
}
