// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Pushdata Codec
//!
//! Embeds a fingerprint in the data-carrying (unspendable) output of a ledger
//! transaction and extracts it again.
//!
//! # Script Format
//! ```text
//! [OP_FALSE][OP_RETURN][push][push]...
//! ```
//!
//! Each push is one opcode followed by its length prefix (if any) and data:
//! - `0x00..=0x4b`: direct push, the opcode is the length
//! - `OP_PUSHDATA1`: 1-byte length
//! - `OP_PUSHDATA2`: 2-byte little-endian length
//! - `OP_PUSHDATA4`: 4-byte little-endian length
//!
//! Any other opcode ends the data section. Decoding never fails: a truncated
//! or malformed script yields the pushes read before the damage.

use alloc::string::String;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::CodecError;
use crate::fingerprint::FINGERPRINT_LEN;

pub const OP_FALSE: u8 = 0x00;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Largest payload that fits a direct push.
pub const MAX_DIRECT_PUSH: usize = 75;

/// Opcode classes understood by the data-section walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    /// The opcode itself is the payload length (0..=75).
    Direct(usize),
    PushData1,
    PushData2,
    PushData4,
    /// Not a push; the data section ends here.
    Terminator,
}

impl OpcodeClass {
    pub fn of(op: u8) -> Self {
        match op {
            0..=0x4b => OpcodeClass::Direct(op as usize),
            OP_PUSHDATA1 => OpcodeClass::PushData1,
            OP_PUSHDATA2 => OpcodeClass::PushData2,
            OP_PUSHDATA4 => OpcodeClass::PushData4,
            _ => OpcodeClass::Terminator,
        }
    }

    /// Width of the length prefix following the opcode.
    pub fn prefix_width(self) -> usize {
        match self {
            OpcodeClass::PushData1 => 1,
            OpcodeClass::PushData2 => 2,
            OpcodeClass::PushData4 => 4,
            OpcodeClass::Direct(_) | OpcodeClass::Terminator => 0,
        }
    }

    /// Smallest class able to carry `len` bytes.
    pub fn for_len(len: usize) -> Self {
        if len <= MAX_DIRECT_PUSH {
            OpcodeClass::Direct(len)
        } else if len <= u8::MAX as usize {
            OpcodeClass::PushData1
        } else if len <= u16::MAX as usize {
            OpcodeClass::PushData2
        } else {
            OpcodeClass::PushData4
        }
    }
}

/// Appends one length-prefixed push of `payload` to `script`.
///
/// Payloads must stay below 4 GiB, the limit of `OP_PUSHDATA4`.
pub fn push(script: &mut Vec<u8>, payload: &[u8]) {
    let len = payload.len();
    match OpcodeClass::for_len(len) {
        OpcodeClass::Direct(n) => script.push(n as u8),
        OpcodeClass::PushData1 => {
            script.push(OP_PUSHDATA1);
            script.push(len as u8);
        }
        OpcodeClass::PushData2 => {
            let mut buf = [0u8; 2];
            LittleEndian::write_u16(&mut buf, len as u16);
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&buf);
        }
        OpcodeClass::PushData4 | OpcodeClass::Terminator => {
            debug_assert!(len <= u32::MAX as usize);
            let mut buf = [0u8; 4];
            LittleEndian::write_u32(&mut buf, len as u32);
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&buf);
        }
    }
    script.extend_from_slice(payload);
}

/// Builds the data-carrier output script for `payload`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(payload.len() + 7);
    script.push(OP_FALSE);
    script.push(OP_RETURN);
    push(&mut script, payload);
    script
}

pub fn encode_hex(payload: &[u8]) -> String {
    hex::encode(encode(payload))
}

/// Pushes recovered from a script, plus the reason the walk stopped early (if it did).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub items: Vec<Vec<u8>>,
    pub stopped: Option<CodecError>,
}

/// Decodes every push following the first `OP_RETURN` in `script_hex`.
///
/// Returns an empty list when there is no marker.
pub fn decode(script_hex: &str) -> Vec<Vec<u8>> {
    decode_detailed(script_hex).items
}

pub fn decode_detailed(script_hex: &str) -> Decoded {
    let (bytes, hex_err) = hex_prefix(script_hex.trim());
    let mut decoded = decode_script(&bytes);
    if decoded.stopped.is_none() {
        decoded.stopped = hex_err;
    }
    decoded
}

/// Same as [`decode_detailed`] on raw script bytes.
pub fn decode_script(script: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();

    let marker = match script.iter().position(|&b| b == OP_RETURN) {
        Some(pos) => pos,
        None => return decoded,
    };

    let mut cursor = marker + 1;
    while cursor < script.len() {
        let op_offset = cursor;
        let class = OpcodeClass::of(script[cursor]);
        cursor += 1;

        let len = match class {
            OpcodeClass::Terminator => break,
            OpcodeClass::Direct(n) => n,
            prefixed => {
                let width = prefixed.prefix_width();
                if cursor + width > script.len() {
                    decoded.stopped = Some(CodecError::TruncatedLength { offset: op_offset, width });
                    break;
                }
                let prefix = &script[cursor..cursor + width];
                cursor += width;
                match width {
                    1 => prefix[0] as usize,
                    2 => LittleEndian::read_u16(prefix) as usize,
                    _ => LittleEndian::read_u32(prefix) as usize,
                }
            }
        };

        let available = script.len() - cursor;
        if len > available {
            decoded.stopped = Some(CodecError::TruncatedPayload {
                offset: op_offset,
                declared: len,
                available,
            });
            break;
        }

        decoded.items.push(script[cursor..cursor + len].to_vec());
        cursor += len;
    }

    decoded
}

/// First decoded item that is exactly one digest long, else the first item.
pub fn select_fingerprint(items: &[Vec<u8>]) -> Option<&[u8]> {
    items
        .iter()
        .find(|item| item.len() == FINGERPRINT_LEN)
        .or_else(|| items.first())
        .map(|item| item.as_slice())
}

/// Hex fingerprint carried by a data-carrier script, if any.
pub fn fingerprint_from_script(script_hex: &str) -> Option<String> {
    let items = decode(script_hex);
    select_fingerprint(&items).map(hex::encode)
}

/// Decodes hex pairs up to the first invalid one.
fn hex_prefix(s: &str) -> (Vec<u8>, Option<CodecError>) {
    let raw = s.as_bytes();
    let mut out = Vec::with_capacity(raw.len() / 2);
    for (i, pair) in raw.chunks(2).enumerate() {
        let byte = match pair {
            [hi, lo] => match (nibble(*hi), nibble(*lo)) {
                (Some(hi), Some(lo)) => (hi << 4) | lo,
                _ => return (out, Some(CodecError::InvalidHex { offset: i })),
            },
            _ => return (out, Some(CodecError::InvalidHex { offset: i })),
        };
        out.push(byte);
    }
    (out, None)
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_classes() {
        assert_eq!(OpcodeClass::of(0x00), OpcodeClass::Direct(0));
        assert_eq!(OpcodeClass::of(0x4b), OpcodeClass::Direct(75));
        assert_eq!(OpcodeClass::of(0x4c), OpcodeClass::PushData1);
        assert_eq!(OpcodeClass::of(0x4d), OpcodeClass::PushData2);
        assert_eq!(OpcodeClass::of(0x4e), OpcodeClass::PushData4);
        assert_eq!(OpcodeClass::of(0x4f), OpcodeClass::Terminator);
        assert_eq!(OpcodeClass::of(0xac), OpcodeClass::Terminator);
    }

    #[test]
    fn test_smallest_prefix_chosen() {
        assert_eq!(encode(&[0u8; 75])[2], 75);
        assert_eq!(&encode(&[0u8; 76])[2..4], &[OP_PUSHDATA1, 76]);
        assert_eq!(&encode(&[0u8; 256])[2..5], &[OP_PUSHDATA2, 0x00, 0x01]);
        assert_eq!(&encode(&[0u8; 65536])[2..7], &[OP_PUSHDATA4, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_fingerprint_script_hex() {
        let digest = [0x11u8; 32];
        let script = encode_hex(&digest);
        assert!(script.starts_with("006a20"));
        assert_eq!(fingerprint_from_script(&script), Some(hex::encode(digest)));
    }

    #[test]
    fn test_no_marker_is_empty() {
        assert!(decode("76a914").is_empty());
        assert!(decode("").is_empty());
    }

    #[test]
    fn test_terminator_stops_quietly() {
        // OP_RETURN, push "ab", OP_CHECKSIG, push "cd"
        let decoded = decode_detailed("6a01ab ac01cd".replace(' ', "").as_str());
        assert_eq!(decoded.items, vec![vec![0xab]]);
        assert_eq!(decoded.stopped, None);
    }

    #[test]
    fn test_invalid_hex_keeps_prefix() {
        let decoded = decode_detailed("6a02abcdzz");
        assert_eq!(decoded.items, vec![vec![0xab, 0xcd]]);
        assert_eq!(decoded.stopped, Some(CodecError::InvalidHex { offset: 4 }));
    }

    #[test]
    fn test_select_prefers_digest_length() {
        let items = vec![vec![1u8, 2, 3], vec![7u8; 32]];
        assert_eq!(select_fingerprint(&items), Some(&[7u8; 32][..]));

        let short = vec![vec![1u8, 2, 3]];
        assert_eq!(select_fingerprint(&short), Some(&[1u8, 2, 3][..]));

        assert_eq!(select_fingerprint(&[]), None);
    }
}
