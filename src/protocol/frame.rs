//! Frame decoder: raw byte stream to validated frames.
//!
//! The transport may split or coalesce frames arbitrarily, so the decoder keeps
//! an accumulation buffer across [`FrameDecoder::feed`] calls and hands out
//! complete frames lazily through [`FrameDecoder::next_frame`] /
//! [`FrameDecoder::frames`].
//!
//! Resynchronization rules:
//! - a frame failing its integrity check is reported once as
//!   [`DecodeError::CorruptFrame`] and its bytes are dropped; the next frame is
//!   decoded normally;
//! - a buffer that grows past `max_frame_len` without a boundary is reported as
//!   [`DecodeError::FrameTooLarge`]; everything up to and including the next
//!   terminator is then discarded.

use crate::error::DecodeError;
use crate::protocol::integrity::FrameIntegrity;
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Default response/command terminator for Ruska instruments.
pub const DEFAULT_TERMINATOR: &str = "\r";

/// Default bound on a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256;

/// How frame boundaries are detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameBoundary {
    /// Frames end with this sequence (not included in the frame).
    Terminator(String),
    /// Every frame is exactly this many bytes.
    FixedLength(usize),
}

impl Default for FrameBoundary {
    fn default() -> Self {
        FrameBoundary::Terminator(DEFAULT_TERMINATOR.to_string())
    }
}

/// Framing settings shared by the decoder and the command encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Boundary detection.
    #[serde(default)]
    pub boundary: FrameBoundary,
    /// Largest frame (excluding terminator) before the buffer is considered stuck.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Integrity check applied to every frame.
    #[serde(default)]
    pub integrity: FrameIntegrity,
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            boundary: FrameBoundary::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            integrity: FrameIntegrity::None,
        }
    }
}

impl FramingConfig {
    /// Set the integrity check.
    pub fn with_integrity(mut self, integrity: FrameIntegrity) -> Self {
        self.integrity = integrity;
        self
    }

    /// Set the frame size bound.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Use a fixed frame length instead of a terminator.
    pub fn with_fixed_length(mut self, len: usize) -> Self {
        self.boundary = FrameBoundary::FixedLength(len);
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), String> {
        match &self.boundary {
            FrameBoundary::Terminator(t) if t.is_empty() => {
                return Err("framing terminator must not be empty".into())
            }
            FrameBoundary::FixedLength(0) => {
                return Err("fixed frame length must be positive".into())
            }
            _ => {}
        }
        if self.max_frame_len == 0 {
            return Err("max_frame_len must be positive".into());
        }
        Ok(())
    }

    /// Encode `payload` into its wire form: payload, checksum suffix, terminator.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 8);
        out.extend_from_slice(payload);
        self.integrity.append_suffix(payload, &mut out);
        if let FrameBoundary::Terminator(t) = &self.boundary {
            out.extend_from_slice(t.as_bytes());
        }
        out
    }
}

/// A validated frame with terminator and checksum suffix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    payload: Bytes,
    checksum: Option<u32>,
}

impl RawFrame {
    /// Build a frame from an already validated payload.
    pub fn new(payload: impl Into<Bytes>, checksum: Option<u32>) -> Self {
        Self {
            payload: payload.into(),
            checksum,
        }
    }

    /// Payload bytes (printable ASCII).
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Checksum carried by the frame, if the integrity mode uses one.
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// Payload as text. Integrity validation guarantees printable ASCII.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("")
    }

    /// Comma-separated fields of the payload.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.as_str().split(',').map(str::trim)
    }
}

impl std::fmt::Display for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental frame decoder bound to one channel's byte ordering.
#[derive(Debug)]
pub struct FrameDecoder {
    config: FramingConfig,
    buffer: BytesMut,
    /// Set after an overrun: drop input until the next terminator.
    discarding: bool,
}

impl FrameDecoder {
    /// Create a decoder for the given framing.
    pub fn new(config: FramingConfig) -> Self {
        let capacity = config.max_frame_len + 16;
        Self {
            config,
            buffer: BytesMut::with_capacity(capacity),
            discarding: false,
        }
    }

    /// Framing settings in use.
    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    /// Append a chunk of received bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes and any pending resynchronization.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feed a chunk and return the frames completed by it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Result<RawFrame, DecodeError>> {
        self.feed(chunk);
        self.frames().collect()
    }

    /// Lazily yield every complete frame currently buffered.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Take the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Result<RawFrame, DecodeError>> {
        match self.config.boundary.clone() {
            FrameBoundary::Terminator(terminator) => self.next_terminated(terminator.as_bytes()),
            FrameBoundary::FixedLength(len) => self.next_fixed(len),
        }
    }

    fn next_terminated(&mut self, terminator: &[u8]) -> Option<Result<RawFrame, DecodeError>> {
        loop {
            let boundary = find(&self.buffer, terminator);

            if self.discarding {
                match boundary {
                    Some(pos) => {
                        self.buffer.advance(pos + terminator.len());
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        // Keep a possible partial terminator at the tail.
                        let keep = terminator.len().saturating_sub(1).min(self.buffer.len());
                        let drop = self.buffer.len() - keep;
                        self.buffer.advance(drop);
                        return None;
                    }
                }
            }

            let Some(pos) = boundary else {
                self.skip_leading_whitespace(terminator);
                if pending_frame_len(&self.buffer, terminator) > self.config.max_frame_len {
                    let keep = partial_terminator_len(&self.buffer, terminator);
                    let drop = self.buffer.len() - keep;
                    self.buffer.advance(drop);
                    self.discarding = true;
                    return Some(Err(DecodeError::FrameTooLarge {
                        limit: self.config.max_frame_len,
                    }));
                }
                return None;
            };

            let raw = self.buffer.split_to(pos).freeze();
            self.buffer.advance(terminator.len());

            let trimmed = trim_ascii_whitespace(raw);
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.len() > self.config.max_frame_len {
                return Some(Err(DecodeError::FrameTooLarge {
                    limit: self.config.max_frame_len,
                }));
            }
            return Some(self.validate(trimmed));
        }
    }

    /// Drop whitespace the frame trim would remove anyway, keeping any tail
    /// that may be the start of a terminator.
    fn skip_leading_whitespace(&mut self, terminator: &[u8]) {
        let leading = self
            .buffer
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        let keep = partial_terminator_len(&self.buffer, terminator);
        let drop = leading.min(self.buffer.len() - keep);
        self.buffer.advance(drop);
    }

    fn next_fixed(&mut self, len: usize) -> Option<Result<RawFrame, DecodeError>> {
        if self.buffer.len() < len {
            return None;
        }
        let raw = self.buffer.split_to(len).freeze();
        Some(self.validate(raw))
    }

    fn validate(&self, raw: Bytes) -> Result<RawFrame, DecodeError> {
        match self.config.integrity.verify(&raw) {
            Ok((body_len, checksum)) => Ok(RawFrame {
                payload: raw.slice(..body_len),
                checksum,
            }),
            Err(reason) => Err(DecodeError::CorruptFrame {
                reason,
                len: raw.len(),
            }),
        }
    }
}

/// Iterator over the frames currently buffered in a [`FrameDecoder`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<RawFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() == 1 {
        return haystack.iter().position(|&b| b == needle[0]);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest proper prefix of `terminator` that ends `buf`.
fn partial_terminator_len(buf: &[u8], terminator: &[u8]) -> usize {
    (1..terminator.len())
        .rev()
        .find(|&k| buf.ends_with(&terminator[..k]))
        .unwrap_or(0)
}

/// Size the unterminated frame at the head of `buf` will have once trimmed.
fn pending_frame_len(buf: &[u8], terminator: &[u8]) -> usize {
    let body = &buf[..buf.len() - partial_terminator_len(buf, terminator)];
    let (start, end) = trimmed_bounds(body);
    end - start
}

fn trimmed_bounds(raw: &[u8]) -> (usize, usize) {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    (start, end)
}

fn trim_ascii_whitespace(raw: Bytes) -> Bytes {
    let (start, end) = trimmed_bounds(&raw);
    raw.slice(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorruptReason;

    fn ok_payloads(results: Vec<Result<RawFrame, DecodeError>>) -> Vec<String> {
        results
            .into_iter()
            .map(|r| r.unwrap().as_str().to_string())
            .collect()
    }

    #[test]
    fn decodes_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new(FramingConfig::default());
        assert!(decoder.decode(b"PA,10").is_empty());
        assert!(decoder.decode(b"0.12").is_empty());
        let frames = ok_payloads(decoder.decode(b"3\rPB,"));
        assert_eq!(frames, vec!["PA,100.123"]);
        assert_eq!(decoder.buffered(), 3);
    }

    #[test]
    fn decodes_coalesced_frames_in_order() {
        let mut decoder = FrameDecoder::new(FramingConfig::default());
        let frames = ok_payloads(decoder.decode(b"PA,1.0\r\nPA,2.0\r\nPA,3.0\r\n"));
        assert_eq!(frames, vec!["PA,1.0", "PA,2.0", "PA,3.0"]);
    }

    #[test]
    fn corrupt_frame_between_valid_frames_is_reported_once() {
        let config = FramingConfig::default().with_integrity(FrameIntegrity::Xor8);
        let mut bytes = config.encode(b"PA,100.0");
        let mut bad = config.encode(b"PA,99.5");
        bad[3] = b'8';
        bytes.extend_from_slice(&bad);
        bytes.extend_from_slice(&config.encode(b"PA,99.0"));

        let mut decoder = FrameDecoder::new(config);
        let results = decoder.decode(&bytes);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().as_str(), "PA,100.0");
        assert!(matches!(
            results[1],
            Err(DecodeError::CorruptFrame {
                reason: CorruptReason::Mismatch { .. },
                ..
            })
        ));
        assert_eq!(results[2].as_ref().unwrap().as_str(), "PA,99.0");
    }

    #[test]
    fn overrun_resyncs_at_next_terminator() {
        let config = FramingConfig::default().with_max_frame_len(8);
        let mut decoder = FrameDecoder::new(config);

        let results = decoder.decode(b"garbage-without-end");
        assert_eq!(results, vec![Err(DecodeError::FrameTooLarge { limit: 8 })]);

        // Tail of the stuck frame is discarded, the next frame survives.
        let frames = ok_payloads(decoder.decode(b"more-garbage\rPA,1.5\r"));
        assert_eq!(frames, vec!["PA,1.5"]);
    }

    #[test]
    fn multi_byte_terminator_split_between_chunks() {
        let config = FramingConfig {
            boundary: FrameBoundary::Terminator("\r\n".to_string()),
            ..FramingConfig::default()
        };
        let mut decoder = FrameDecoder::new(config);
        assert!(decoder.decode(b"PS,12.5\r").is_empty());
        assert_eq!(ok_payloads(decoder.decode(b"\n")), vec!["PS,12.5"]);
    }

    #[test]
    fn full_length_frame_survives_split_before_terminator() {
        let config = FramingConfig {
            boundary: FrameBoundary::Terminator("\r\n".to_string()),
            ..FramingConfig::default()
        }
        .with_max_frame_len(8);

        let mut decoder = FrameDecoder::new(config.clone());
        assert!(decoder.decode(b"PA,1.234\r").is_empty());
        let frames = ok_payloads(decoder.decode(b"\nPA,2.000\r\n"));
        assert_eq!(frames, vec!["PA,1.234", "PA,2.000"]);

        // Carriage return terminator with CR-LF input: the stray line feed
        // ahead of a full-length frame does not count against the limit.
        let mut decoder = FrameDecoder::new(FramingConfig::default().with_max_frame_len(8));
        assert_eq!(ok_payloads(decoder.decode(b"PA,0\r\nPA,1.234")), vec!["PA,0"]);
        let frames = ok_payloads(decoder.decode(b"\r\nPA,2.000\r\n"));
        assert_eq!(frames, vec!["PA,1.234", "PA,2.000"]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn overrun_split_inside_terminator_keeps_next_frame() {
        let config = FramingConfig {
            boundary: FrameBoundary::Terminator("\r\n".to_string()),
            ..FramingConfig::default()
        }
        .with_max_frame_len(8);

        let mut decoder = FrameDecoder::new(config);
        let results = decoder.decode(b"PA,1.23456789\r");
        assert_eq!(results, vec![Err(DecodeError::FrameTooLarge { limit: 8 })]);
        assert_eq!(ok_payloads(decoder.decode(b"\nPA,2.0\r\n")), vec!["PA,2.0"]);
    }

    #[test]
    fn fixed_length_frames() {
        let config = FramingConfig::default().with_fixed_length(6);
        let mut decoder = FrameDecoder::new(config);
        let frames = ok_payloads(decoder.decode(b"PA,1.0PA,2.0PA"));
        assert_eq!(frames, vec!["PA,1.0", "PA,2.0"]);
        assert_eq!(decoder.buffered(), 2);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut decoder = FrameDecoder::new(FramingConfig::default());
        let frames = ok_payloads(decoder.decode(b"\r\n\r  \rET,1234\r"));
        assert_eq!(frames, vec!["ET,1234"]);
    }

    #[test]
    fn clear_drops_partial_frame() {
        let mut decoder = FrameDecoder::new(FramingConfig::default());
        decoder.feed(b"PA,12");
        decoder.clear();
        assert_eq!(ok_payloads(decoder.decode(b"PA,7.0\r")), vec!["PA,7.0"]);
    }

    #[test]
    fn encode_appends_checksum_and_terminator() {
        let config = FramingConfig::default().with_integrity(FrameIntegrity::Sum8);
        let wire = config.encode(b"PA");
        // 'P' + 'A' = 0x50 + 0x41 = 0x91
        assert_eq!(wire, b"PA*91\r");
    }

    #[test]
    fn fields_split_on_commas() {
        let frame = RawFrame::new(Bytes::from_static(b"PB, 99.5 ,1234"), None);
        let fields: Vec<&str> = frame.fields().collect();
        assert_eq!(fields, vec!["PB", "99.5", "1234"]);
    }
}
