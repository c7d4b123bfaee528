#![allow(clippy::unwrap_used, clippy::panic, missing_docs)]
//! Property tests for the frame decoder.
//!
//! The decoder must produce the same frames no matter how the byte stream is
//! split into reads, and a corrupted frame must never swallow its neighbours.

use pressure_integrity::error::DecodeError;
use pressure_integrity::protocol::{
    FrameBoundary, FrameDecoder, FrameIntegrity, FramingConfig, RawFrame,
};
use proptest::prelude::*;

/// Printable payloads without the terminator or surrounding whitespace.
fn payload() -> impl Strategy<Value = String> {
    "[A-Z]{2}(,[-0-9.A-Za-z]{1,12}){0,4}"
}

/// Payloads of exactly `FULL_LEN` bytes.
const FULL_LEN: usize = 8;

fn full_length_payload() -> impl Strategy<Value = String> {
    "[A-Z]{2},[0-9]\\.[0-9]{3}"
}

fn wire(framing: &FramingConfig, payloads: &[String]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|p| framing.encode(p.as_bytes()))
        .collect()
}

fn decode_in_chunks(
    framing: &FramingConfig,
    bytes: &[u8],
    cuts: &[usize],
) -> Vec<Result<RawFrame, DecodeError>> {
    let mut decoder = FrameDecoder::new(framing.clone());
    let mut out = Vec::new();
    let mut start = 0;
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.push(bytes.len());
    for end in points {
        if end < start {
            continue;
        }
        out.extend(decoder.decode(&bytes[start..end]));
        start = end;
    }
    out
}

proptest! {
    #[test]
    fn chunking_does_not_change_frames(
        payloads in prop::collection::vec(payload(), 1..12),
        cuts in prop::collection::vec(any::<usize>(), 0..24),
    ) {
        let framing = FramingConfig::default();
        let bytes = wire(&framing, &payloads);

        let whole = decode_in_chunks(&framing, &bytes, &[]);
        let split = decode_in_chunks(&framing, &bytes, &cuts);
        prop_assert_eq!(&whole, &split);

        let decoded: Vec<String> = whole
            .into_iter()
            .map(|r| r.unwrap().as_str().to_string())
            .collect();
        prop_assert_eq!(decoded, payloads);
    }

    #[test]
    fn byte_at_a_time_matches_single_read_with_checksums(
        payloads in prop::collection::vec(payload(), 1..8),
    ) {
        let framing = FramingConfig::default().with_integrity(FrameIntegrity::Crc16Modbus);
        let bytes = wire(&framing, &payloads);

        let every_byte: Vec<usize> = (1..bytes.len()).collect();
        let whole = decode_in_chunks(&framing, &bytes, &[]);
        let split = decode_in_chunks(&framing, &bytes, &every_byte);
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn full_length_frames_survive_any_split_with_crlf_terminator(
        payloads in prop::collection::vec(full_length_payload(), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..24),
    ) {
        let framing = FramingConfig {
            boundary: FrameBoundary::Terminator("\r\n".to_string()),
            ..FramingConfig::default()
        }
        .with_max_frame_len(FULL_LEN);
        let bytes = wire(&framing, &payloads);

        let decoded: Vec<String> = decode_in_chunks(&framing, &bytes, &cuts)
            .into_iter()
            .map(|r| r.unwrap().as_str().to_string())
            .collect();
        prop_assert_eq!(decoded, payloads);
    }

    #[test]
    fn full_length_frames_survive_any_split_with_crlf_input(
        payloads in prop::collection::vec(full_length_payload(), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..24),
    ) {
        let framing = FramingConfig::default().with_max_frame_len(FULL_LEN);
        let bytes: Vec<u8> = payloads
            .iter()
            .flat_map(|p| [p.as_bytes(), &b"\r\n"[..]].concat())
            .collect();

        let decoded: Vec<String> = decode_in_chunks(&framing, &bytes, &cuts)
            .into_iter()
            .map(|r| r.unwrap().as_str().to_string())
            .collect();
        prop_assert_eq!(decoded, payloads);
    }

    #[test]
    fn corrupt_frame_between_valid_frames_is_isolated(
        before in payload(),
        after in payload(),
        garbage in prop::collection::vec(0x01u8..0x08, 1..10),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let framing = FramingConfig::default();
        let mut bytes = framing.encode(before.as_bytes());
        bytes.extend_from_slice(b"PA,");
        bytes.extend_from_slice(&garbage);
        bytes.push(b'\r');
        bytes.extend(framing.encode(after.as_bytes()));

        let results = decode_in_chunks(&framing, &bytes, &cuts);
        prop_assert_eq!(results.len(), 3);
        prop_assert_eq!(results[0].as_ref().unwrap().as_str(), before.as_str());
        let corrupt = matches!(results[1], Err(DecodeError::CorruptFrame { .. }));
        prop_assert!(corrupt);
        prop_assert_eq!(results[2].as_ref().unwrap().as_str(), after.as_str());
    }
}

#[test]
fn overrun_resynchronizes_on_next_terminator() {
    let framing = FramingConfig::default().with_max_frame_len(16);
    let mut decoder = FrameDecoder::new(framing);

    let results = decoder.decode(&[b'x'; 40]);
    assert!(matches!(
        results.as_slice(),
        [Err(DecodeError::FrameTooLarge { limit: 16 })]
    ));

    let results = decoder.decode(b"tail-of-noise\rPA,101.3\r");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().as_str(), "PA,101.3");
}
