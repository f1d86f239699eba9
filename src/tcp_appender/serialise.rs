//! Wire encoding of log entries.
//!
//! Every frame opens with [`HEADER`](super::handshake::HEADER), an opcode and
//! the session token. Single entries follow with a length-prefixed
//! MessagePack body; partial entries first add the partial id, the part
//! index, the part count and the token-size estimate.

use std::collections::BTreeMap;

use rand::{RngCore, SeedableRng, rngs::StdRng};
use rmp_serde::Serializer;
use serde::Serialize;

use super::{config::SkipFlags, error::FrameError, handshake::HEADER};
use crate::{fields::FieldDecorations, level::LogdocLevel, log_record::LogdocRecord};

/// Opcode of a complete log entry.
pub const OP_LOG_ENTRY: u8 = 0x02;
/// Opcode of one part of a split log entry.
pub const OP_PARTIAL_ENTRY: u8 = 0x03;

/// Random tag shared by every part of one split record.
pub type PartialId = [u8; 8];

/// Position of one part within a split record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartInfo {
    pub partial_id: PartialId,
    pub index: usize,
    pub total_parts: usize,
    pub total_size_tokens: i32,
}

#[derive(Serialize)]
struct WireEntry<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<LogdocLevel>,
    message: &'a str,
    fields: &'a [(String, String)],
}

/// Collector-side size hint for a split record.
///
/// This is a token-count estimate, not a byte length; the collector relies on
/// the exact formula so it must not change.
pub fn total_size_tokens(token_size: i32, total_parts: usize) -> i32 {
    if total_parts == 0 {
        return 0;
    }
    let parts = i32::try_from(total_parts).unwrap_or(i32::MAX);
    token_size.wrapping_mul(parts).wrapping_sub(1)
}

/// Stateless encoder apart from its partial-id source.
pub struct Framer {
    skip: SkipFlags,
    decorations: FieldDecorations,
    max_frame_size: usize,
    rng: Box<dyn RngCore + Send>,
}

impl Framer {
    pub fn new(skip: SkipFlags, decorations: FieldDecorations, max_frame_size: usize) -> Self {
        Self::with_rng(skip, decorations, max_frame_size, Box::new(StdRng::from_entropy()))
    }

    /// Construct a framer drawing partial ids from `rng`.
    pub fn with_rng(
        skip: SkipFlags,
        decorations: FieldDecorations,
        max_frame_size: usize,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            skip,
            decorations,
            max_frame_size,
            rng,
        }
    }

    /// Draw a fresh partial id for the next split record.
    pub fn next_partial_id(&mut self) -> PartialId {
        let mut id = [0u8; 8];
        self.rng.fill_bytes(&mut id);
        id
    }

    /// Encode `text` as one complete entry.
    pub fn encode_single(
        &self,
        token: &[u8],
        record: &LogdocRecord,
        text: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, FrameError> {
        let body = self.body(record, text, fields)?;
        let mut frame = start_frame(OP_LOG_ENTRY, token, body.len())?;
        put_body(&mut frame, &body)?;
        Ok(frame)
    }

    /// Encode one part of a split entry.
    pub fn encode_multipart(
        &self,
        token: &[u8],
        part: &PartInfo,
        record: &LogdocRecord,
        payload: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, FrameError> {
        let body = self.body(record, payload, fields)?;
        let mut frame = start_frame(OP_PARTIAL_ENTRY, token, body.len() + 20)?;
        frame.extend_from_slice(&part.partial_id);
        frame.extend(saturating_u32(part.index).to_be_bytes());
        frame.extend(saturating_u32(part.total_parts).to_be_bytes());
        frame.extend(part.total_size_tokens.to_be_bytes());
        put_body(&mut frame, &body)?;
        Ok(frame)
    }

    fn body(
        &self,
        record: &LogdocRecord,
        text: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, FrameError> {
        let fields = self.decorations.apply(fields);
        let entry = WireEntry {
            time: (!self.skip.time).then(|| record.metadata.timestamp.timestamp_millis()),
            source: (!self.skip.source).then_some(record.metadata.source.as_str()),
            level: (!self.skip.level).then_some(record.metadata.level),
            message: text,
            fields: &fields,
        };
        let mut buf = Vec::with_capacity(64 + text.len());
        entry.serialize(&mut Serializer::new(&mut buf).with_struct_map())?;
        if buf.len() > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: buf.len(),
                max: self.max_frame_size,
            });
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for Framer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("skip", &self.skip)
            .field("decorations", &self.decorations)
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn start_frame(opcode: u8, token: &[u8], extra: usize) -> Result<Vec<u8>, FrameError> {
    let token_len = u16::try_from(token.len()).map_err(|_| FrameError::TokenTooLong(token.len()))?;
    let mut frame = Vec::with_capacity(HEADER.len() + 7 + token.len() + extra);
    frame.extend(HEADER);
    frame.push(opcode);
    frame.extend(token_len.to_be_bytes());
    frame.extend_from_slice(token);
    Ok(frame)
}

/// Append the body with a big-endian `u32` length prefix.
fn put_body(frame: &mut Vec<u8>, body: &[u8]) -> Result<(), FrameError> {
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;
    frame.extend(len.to_be_bytes());
    frame.extend_from_slice(body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp_appender::test_support::decode_frames;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    const TOKEN: &[u8] = b"token-0123456789";

    #[fixture]
    fn record() -> LogdocRecord {
        LogdocRecord::new("app.db", LogdocLevel::Warn, "slow query")
            .with_timestamp(chrono::Utc.timestamp_millis_opt(1_700_000_000_123).unwrap())
    }

    fn framer(skip: SkipFlags) -> Framer {
        Framer::with_rng(
            skip,
            FieldDecorations::new(Some("db"), None),
            1024,
            Box::new(StdRng::seed_from_u64(7)),
        )
    }

    #[rstest]
    fn single_frame_carries_token_metadata_and_fields(record: LogdocRecord) {
        let fields = BTreeMap::from([("ms".to_string(), "900".to_string())]);
        let frame = framer(SkipFlags::default())
            .encode_single(TOKEN, &record, "slow query", &fields)
            .unwrap();
        assert_eq!(&frame[..3], [0xCA, 0xFE, OP_LOG_ENTRY]);

        let decoded = decode_frames(&frame);
        assert_eq!(decoded.len(), 1);
        let entry = &decoded[0].entry;
        assert_eq!(decoded[0].token, TOKEN);
        assert!(decoded[0].part.is_none());
        assert_eq!(entry.time, Some(1_700_000_000_123));
        assert_eq!(entry.source.as_deref(), Some("app.db"));
        assert_eq!(entry.level.as_deref(), Some("WARN"));
        assert_eq!(entry.message, "slow query");
        assert_eq!(entry.fields, vec![("db.ms".to_string(), "900".to_string())]);
    }

    #[rstest]
    fn skip_flags_omit_metadata(record: LogdocRecord) {
        let skip = SkipFlags {
            time: true,
            source: true,
            level: true,
        };
        let frame = framer(skip)
            .encode_single(TOKEN, &record, "x", &BTreeMap::new())
            .unwrap();
        let entry = &decode_frames(&frame)[0].entry;
        assert!(entry.time.is_none());
        assert!(entry.source.is_none());
        assert!(entry.level.is_none());
    }

    #[rstest]
    fn multipart_frame_carries_part_header(record: LogdocRecord) {
        let mut framer = framer(SkipFlags::default());
        let part = PartInfo {
            partial_id: framer.next_partial_id(),
            index: 1,
            total_parts: 3,
            total_size_tokens: total_size_tokens(4, 3),
        };
        let frame = framer
            .encode_multipart(TOKEN, &part, &record, "uery", &BTreeMap::new())
            .unwrap();
        let decoded = decode_frames(&frame);
        assert_eq!(decoded[0].opcode, OP_PARTIAL_ENTRY);
        assert_eq!(decoded[0].part, Some(part));
        assert_eq!(decoded[0].entry.message, "uery");
    }

    #[rstest]
    #[case(4, 3, 11)]
    #[case(-1, 3, -4)]
    #[case(100, 1, 99)]
    #[case(4, 0, 0)]
    fn total_size_tokens_keeps_the_collector_formula(
        #[case] token_size: i32,
        #[case] parts: usize,
        #[case] expected: i32,
    ) {
        assert_eq!(total_size_tokens(token_size, parts), expected);
    }

    #[rstest]
    fn partial_ids_differ_between_draws() {
        let mut framer = framer(SkipFlags::default());
        assert_ne!(framer.next_partial_id(), framer.next_partial_id());
    }

    #[rstest]
    fn oversized_body_is_rejected(record: LogdocRecord) {
        let text = "x".repeat(2048);
        let err = framer(SkipFlags::default())
            .encode_single(TOKEN, &record, &text, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { max: 1024, .. }));
    }
}
