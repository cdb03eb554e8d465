//! Length-framed wire header: `size:u32le || opcode:u16le || payload`.
//!
//! `size` counts itself (4 bytes) but not the opcode field, so
//! `payload_len = size - 4` and the full frame occupies `6 + payload_len`
//! bytes on the wire.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FrameError;
use crate::opcode::Opcode;

const HEADER_LEN: usize = 6;

/// Builds a single framed message: `size || opcode || payload`.
pub fn frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let size = 4u32 + payload.len() as u32;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&opcode.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Greedily parses as many complete frames as `buf` holds.
///
/// Returns the parsed `(opcode, payload)` pairs plus the number of bytes
/// consumed from the front of `buf`; the caller drops that many bytes and
/// keeps the remainder (a partial frame, or nothing) for the next read.
pub fn parse_frames(buf: &[u8]) -> Result<(Vec<(Opcode, Vec<u8>)>, usize), FrameError> {
    let mut frames = Vec::new();
    let mut pos = 0usize;

    loop {
        if buf.len() - pos < HEADER_LEN {
            break;
        }
        let size = LittleEndian::read_u32(&buf[pos..pos + 4]);
        if size < 4 {
            return Err(FrameError::Malformed(size));
        }
        let payload_len = (size - 4) as usize;
        let frame_len = HEADER_LEN + payload_len;
        if buf.len() - pos < frame_len {
            break;
        }
        let opcode = LittleEndian::read_u16(&buf[pos + 4..pos + 6]);
        let payload = buf[pos + HEADER_LEN..pos + frame_len].to_vec();
        frames.push((opcode, payload));
        pos += frame_len;
    }

    Ok((frames, pos))
}
