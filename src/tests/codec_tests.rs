// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::CodecError;
use crate::pushdata::{decode, decode_detailed, decode_script, encode, encode_hex, OP_PUSHDATA2, OP_PUSHDATA4, OP_RETURN};
use std::vec::Vec;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_roundtrip_at_prefix_boundaries() {
    // Edges of direct / PUSHDATA1 / PUSHDATA2 / PUSHDATA4
    for len in [0usize, 1, 75, 76, 255, 256, 65535, 65536] {
        let data = payload(len);
        let decoded = decode(&encode_hex(&data));
        assert_eq!(decoded, vec![data], "round trip failed for {} bytes", len);
    }
}

#[test]
fn test_truncated_length_prefix_does_not_panic() {
    // OP_RETURN, OP_PUSHDATA2, only one of two length bytes
    let decoded = decode_detailed("6a4d05");
    assert!(decoded.items.is_empty());
    assert_eq!(decoded.stopped, Some(CodecError::TruncatedLength { offset: 1, width: 2 }));

    // OP_RETURN, OP_PUSHDATA4 with three length bytes
    let decoded = decode_detailed("6a4e010000");
    assert!(decoded.items.is_empty());
    assert!(matches!(decoded.stopped, Some(CodecError::TruncatedLength { width: 4, .. })));

    // Odd nibble count cutting a length byte in half
    let decoded = decode_detailed("6a4c0");
    assert!(decoded.items.is_empty());
}

#[test]
fn test_declared_length_past_end_keeps_earlier_items() {
    let mut script = vec![OP_RETURN, 0x02, 0xaa, 0xbb, 0x10, 0x01];
    let decoded = decode_script(&script);
    assert_eq!(decoded.items, vec![vec![0xaa, 0xbb]]);
    assert_eq!(
        decoded.stopped,
        Some(CodecError::TruncatedPayload { offset: 4, declared: 16, available: 1 })
    );

    // huge PUSHDATA4 length on a tiny script
    script.truncate(4);
    script.extend_from_slice(&[OP_PUSHDATA4, 0xff, 0xff, 0xff, 0xff, 0x00]);
    let decoded = decode_script(&script);
    assert_eq!(decoded.items.len(), 1);
}

#[test]
fn test_multiple_pushes() {
    let mut script = encode(b"first");
    crate::pushdata::push(&mut script, &[9u8; 300]);
    let decoded = decode(&hex::encode(&script));
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0], b"first".to_vec());
    assert_eq!(decoded[1].len(), 300);
    assert_eq!(script[2 + 1 + 5], OP_PUSHDATA2);
}

#[test]
fn test_uppercase_script_hex() {
    let data = [0xABu8; 32];
    let script = encode_hex(&data).to_uppercase();
    assert_eq!(decode(&script), vec![data.to_vec()]);
}
