//! RFC 6455 text framing.
//!
//! Server → client frames are never masked:
//! `[0x81][len7][extended len?][payload]`
//!
//! Client → server frames always carry a 4-byte mask between the length
//! field and the payload, and every payload byte is XOR-ed with
//! `mask[i % 4]`.

/// FIN bit set, opcode 0x1 (text).
const FIN_TEXT: u8 = 0x81;

/// FIN bit set, opcode 0x8 (close).
pub const CLOSE_FRAME_HEADER: u8 = 0x88;

const MASK_BIT: u8 = 0x80;
const LEN_16_MARKER: u8 = 126;
const LEN_64_MARKER: u8 = 127;

pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_CLOSE: u8 = 0x8;

/// How a payload length is carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    /// Length fits in the 7-bit field (0..=125).
    Short,
    /// Marker 126 followed by a big-endian u16.
    Extended16,
    /// Marker 127 followed by a big-endian u64.
    Extended64,
}

impl LengthField {
    pub fn for_len(len: usize) -> Self {
        match len {
            0..=125 => LengthField::Short,
            126..=65535 => LengthField::Extended16,
            _ => LengthField::Extended64,
        }
    }
}

fn push_length(out: &mut Vec<u8>, len: usize, mask_bit: u8) {
    match LengthField::for_len(len) {
        LengthField::Short => out.push(mask_bit | len as u8),
        LengthField::Extended16 => {
            out.push(mask_bit | LEN_16_MARKER);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        LengthField::Extended64 => {
            out.push(mask_bit | LEN_64_MARKER);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
}

/// Encode a payload as a single unmasked text frame (server → client).
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(10 + payload.len());
    frame.push(FIN_TEXT);
    push_length(&mut frame, payload.len(), 0);
    frame.extend_from_slice(payload);
    frame
}

/// Encode a payload as a single masked text frame (client → server).
pub fn encode_masked(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.push(FIN_TEXT);
    push_length(&mut frame, payload.len(), MASK_BIT);
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    frame
}

/// The empty close frame sent on orderly teardown.
pub fn close_frame() -> [u8; 2] {
    [CLOSE_FRAME_HEADER, 0x00]
}

/// Whether a chunk read from a client starts with a close frame.
///
/// Must be checked before [`decode`], which assumes text.
pub fn is_close_frame(data: &[u8]) -> bool {
    data.first() == Some(&CLOSE_FRAME_HEADER)
}

/// Read the length field starting at byte 1.
///
/// Returns `(payload_len, header_end)`, or `None` if the extended length
/// bytes are not all present.
fn read_length(frame: &[u8]) -> Option<(usize, usize)> {
    match frame.get(1)? & 0x7F {
        LEN_16_MARKER => {
            let bytes = frame.get(2..4)?;
            Some((u16::from_be_bytes([bytes[0], bytes[1]]) as usize, 4))
        }
        LEN_64_MARKER => {
            let bytes: [u8; 8] = frame.get(2..10)?.try_into().ok()?;
            let len = usize::try_from(u64::from_be_bytes(bytes)).ok()?;
            Some((len, 10))
        }
        short => Some((short as usize, 2)),
    }
}

/// Decode the payload of a masked client frame.
///
/// Returns `None` for fewer than 2 bytes or when the buffer ends before the
/// mask. A truncated payload decodes to the bytes that are present.
pub fn decode(frame: &[u8]) -> Option<Vec<u8>> {
    if frame.len() < 2 {
        return None;
    }
    let (len, mask_start) = read_length(frame)?;
    let mask: [u8; 4] = frame.get(mask_start..mask_start + 4)?.try_into().ok()?;

    let start = mask_start + 4;
    let end = start.saturating_add(len).min(frame.len());

    Some(
        frame[start..end]
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i % 4])
            .collect(),
    )
}

/// A complete frame parsed from the front of a receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    /// Unmasked payload.
    pub payload: Vec<u8>,
    /// Bytes of the input buffer this frame occupied.
    pub consumed: usize,
}

/// Parse one unmasked server frame from the front of `buf`.
///
/// Returns `None` until the whole frame is buffered.
pub fn decode_unmasked(buf: &[u8]) -> Option<Frame> {
    let opcode = buf.first()? & 0x0F;
    let (len, start) = read_length(buf)?;
    let end = start.checked_add(len)?;
    let payload = buf.get(start..end)?.to_vec();
    Some(Frame {
        opcode,
        payload,
        consumed: end,
    })
}

/// Parse one masked client frame from the front of `buf`.
///
/// Unlike [`decode`], this never decodes a partial payload: it returns
/// `None` until header, mask and the whole payload are buffered, and
/// reports how many bytes the frame used so the caller can keep the rest.
pub fn decode_masked(buf: &[u8]) -> Option<Frame> {
    let opcode = buf.first()? & 0x0F;
    let (len, mask_start) = read_length(buf)?;
    let mask: [u8; 4] = buf.get(mask_start..mask_start + 4)?.try_into().ok()?;
    let start = mask_start + 4;
    let end = start.checked_add(len)?;
    let payload = buf
        .get(start..end)?
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ mask[i % 4])
        .collect();
    Some(Frame {
        opcode,
        payload,
        consumed: end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    #[test]
    fn small_frame_layout() {
        let frame = encode(b"hi");
        assert_eq!(frame, vec![0x81, 2, b'h', b'i']);
    }

    #[test]
    fn length_field_boundaries() {
        for (len, expected, header) in [
            (0usize, LengthField::Short, 2usize),
            (125, LengthField::Short, 2),
            (126, LengthField::Extended16, 4),
            (65535, LengthField::Extended16, 4),
            (65536, LengthField::Extended64, 10),
        ] {
            assert_eq!(LengthField::for_len(len), expected, "len {len}");
            let frame = encode(&vec![b'x'; len]);
            assert_eq!(frame.len(), header + len, "len {len}");
        }
    }

    #[test]
    fn extended_lengths_are_big_endian() {
        let frame = encode(&vec![0u8; 300]);
        assert_eq!(frame[1], 126);
        assert_eq!(&frame[2..4], &300u16.to_be_bytes());

        let frame = encode(&vec![0u8; 70_000]);
        assert_eq!(frame[1], 127);
        assert_eq!(&frame[2..10], &70_000u64.to_be_bytes());
    }

    #[test]
    fn masked_round_trip() {
        let payloads: [&[u8]; 4] = [b"", b"a", b"hello", &[0xff; 125]];
        for payload in payloads {
            let frame = encode_masked(payload, MASK);
            assert_eq!(frame[1] & 0x80, 0x80);
            assert_eq!(decode(&frame).unwrap(), payload);
        }
    }

    #[test]
    fn masked_round_trip_extended() {
        let payload = vec![b'z'; 1000];
        let frame = encode_masked(&payload, MASK);
        assert_eq!(decode(&frame).unwrap(), payload);
    }

    #[test]
    fn masked_round_trip_64bit_length() {
        let payload: Vec<u8> = (0..65_536u32).map(|i| (i % 251) as u8).collect();
        let frame = encode_masked(&payload, MASK);
        assert_eq!(frame[1], 0x80 | 127);
        assert_eq!(&frame[2..10], &65_536u64.to_be_bytes());
        assert_eq!(decode(&frame).unwrap(), payload);

        let parsed = decode_masked(&frame).unwrap();
        assert_eq!(parsed.payload, payload);
        assert_eq!(parsed.consumed, frame.len());
    }

    #[test]
    fn masked_frames_back_to_back() {
        let mut buf = encode_masked(b"one", MASK);
        buf.extend(encode_masked(b"two", [1, 2, 3, 4]));

        let first = decode_masked(&buf).unwrap();
        assert_eq!(first.opcode, OPCODE_TEXT);
        assert_eq!(first.payload, b"one");
        let second = decode_masked(&buf[first.consumed..]).unwrap();
        assert_eq!(second.payload, b"two");
        assert_eq!(first.consumed + second.consumed, buf.len());
    }

    #[test]
    fn masked_frame_waits_for_full_payload() {
        let frame = encode_masked(&vec![b'q'; 300], MASK);
        assert!(decode_masked(&frame[..1]).is_none());
        assert!(decode_masked(&frame[..6]).is_none());
        assert!(decode_masked(&frame[..frame.len() - 1]).is_none());
        assert_eq!(decode_masked(&frame).unwrap().payload.len(), 300);
    }

    #[test]
    fn known_masked_frame() {
        // RFC 6455 section 5.7: single-frame masked "Hello".
        let frame = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        assert_eq!(decode(&frame).unwrap(), b"Hello");
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0x81]).is_none());
        // Mask missing.
        assert!(decode(&[0x81, 0x85, 0x37]).is_none());
        // Extended length missing.
        assert!(decode(&[0x81, 0xfe, 0x01]).is_none());
    }

    #[test]
    fn decode_truncated_payload() {
        let frame = encode_masked(b"hello", MASK);
        assert_eq!(decode(&frame[..frame.len() - 2]).unwrap(), b"hel");
    }

    #[test]
    fn close_frame_detection() {
        assert!(is_close_frame(&close_frame()));
        assert!(is_close_frame(&[0x88, 0x80, 1, 2, 3, 4]));
        assert!(!is_close_frame(&encode(b"x")));
        assert!(!is_close_frame(&[]));
    }

    #[test]
    fn unmasked_frame_parsing() {
        let mut buf = encode(b"one");
        buf.extend(encode(&vec![b'2'; 200]));

        let first = decode_unmasked(&buf).unwrap();
        assert_eq!(first.opcode, OPCODE_TEXT);
        assert_eq!(first.payload, b"one");

        let second = decode_unmasked(&buf[first.consumed..]).unwrap();
        assert_eq!(second.payload.len(), 200);
        assert_eq!(first.consumed + second.consumed, buf.len());
    }

    #[test]
    fn unmasked_frame_waits_for_full_payload() {
        let frame = encode(b"partial");
        assert!(decode_unmasked(&frame[..4]).is_none());
        let close = decode_unmasked(&close_frame()).unwrap();
        assert_eq!(close.opcode, OPCODE_CLOSE);
        assert!(close.payload.is_empty());
    }
}
