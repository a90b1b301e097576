//! TSL 3.1 frame codec
//!
//! Every tally update is one fixed 18-byte UDP datagram:
//!
//! | Byte  | Contents                                    |
//! |-------|---------------------------------------------|
//! | 0     | header, always 0x80                         |
//! | 1     | display address, 0-126                      |
//! | 2     | control: bit 0 = tally 1 (PGM), bit 1 = tally 2 (PVW) |
//! | 3     | reserved, 0                                 |
//! | 4-17  | label, ASCII, left-justified, space-padded  |
//!
//! Labels longer than 14 characters are truncated and characters outside
//! printable ASCII are sent as `?`. Neither is an error.

use crate::bank::InputState;
use crate::error::{TslError, TslResult};

/// Length of a TSL 3.1 frame in bytes
pub const FRAME_LEN: usize = 18;

/// Fixed first byte of every frame
pub const FRAME_HEADER: u8 = 0x80;

/// Length of the label field
pub const LABEL_LEN: usize = 14;

/// Highest address a frame can carry
pub const MAX_ADDRESS: u8 = 126;

const LABEL_OFFSET: usize = 4;
const CONTROL_PROGRAM: u8 = 0x01;
const CONTROL_PREVIEW: u8 = 0x02;
const LABEL_PAD: u8 = b' ';
const LABEL_REPLACEMENT: u8 = b'?';

/// One encoded TSL 3.1 frame
pub type Frame = [u8; FRAME_LEN];

fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

/// Render a label into its 14-byte wire form
pub fn wire_label(label: &str) -> [u8; LABEL_LEN] {
    let mut out = [LABEL_PAD; LABEL_LEN];
    for (slot, ch) in out.iter_mut().zip(label.chars()) {
        *slot = if ch.is_ascii() && is_printable(ch as u8) {
            ch as u8
        } else {
            LABEL_REPLACEMENT
        };
    }
    out
}

/// Encode an input into a frame
pub fn encode(input: &InputState) -> TslResult<Frame> {
    let address = input.address();
    if address > MAX_ADDRESS {
        return Err(TslError::InvalidAddress(address));
    }

    let mut control = 0u8;
    if input.program() {
        control |= CONTROL_PROGRAM;
    }
    if input.preview() {
        control |= CONTROL_PREVIEW;
    }

    let mut frame = [0u8; FRAME_LEN];
    frame[0] = FRAME_HEADER;
    frame[1] = address;
    frame[2] = control;
    frame[3] = 0;
    frame[LABEL_OFFSET..].copy_from_slice(&wire_label(input.label()));
    Ok(frame)
}

/// Decode a frame back into an input
pub fn decode(data: &[u8]) -> TslResult<InputState> {
    if data.len() != FRAME_LEN {
        return Err(TslError::MalformedFrame(format!(
            "expected {} bytes, got {}",
            FRAME_LEN,
            data.len()
        )));
    }
    if data[0] != FRAME_HEADER {
        return Err(TslError::MalformedFrame(format!("bad header 0x{:02X}", data[0])));
    }
    if data[1] > MAX_ADDRESS {
        return Err(TslError::MalformedFrame(format!("address {} out of range", data[1])));
    }

    let control = data[2];
    // A NUL ends the label
    let label: String = data[LABEL_OFFSET..]
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if is_printable(b) { b as char } else { LABEL_REPLACEMENT as char })
        .collect();
    let label = label.trim_end_matches(' ').to_string();

    let mut input = InputState::new(data[1])?;
    input.set_flags(control & CONTROL_PROGRAM != 0, control & CONTROL_PREVIEW != 0);
    input.set_label(label);
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(address: u8, program: bool, preview: bool, label: &str) -> InputState {
        let mut i = InputState::new(address).unwrap();
        i.set_flags(program, preview);
        i.set_label(label);
        i
    }

    #[test]
    fn test_encode_example_frame() {
        let frame = encode(&input(5, true, false, "CAM 6")).unwrap();
        let mut expected = vec![0x80, 0x05, 0x01, 0x00, b'C', b'A', b'M', b' ', b'6'];
        expected.extend_from_slice(&[b' '; 9]);
        assert_eq!(frame.to_vec(), expected);
    }

    #[test]
    fn test_encode_fixed_bytes() {
        for address in [0u8, 1, 79, 126] {
            for (pgm, pvw) in [(false, false), (true, false), (false, true), (true, true)] {
                let frame = encode(&input(address, pgm, pvw, "X")).unwrap();
                assert_eq!(frame.len(), FRAME_LEN);
                assert_eq!(frame[0], 0x80);
                assert_eq!(frame[1], address);
                assert_eq!(frame[2] & !0x03, 0);
                assert_eq!(frame[3], 0x00);
            }
        }
    }

    #[test]
    fn test_control_bits() {
        assert_eq!(encode(&input(0, false, false, "")).unwrap()[2], 0x00);
        assert_eq!(encode(&input(0, true, false, "")).unwrap()[2], 0x01);
        assert_eq!(encode(&input(0, false, true, "")).unwrap()[2], 0x02);
        assert_eq!(encode(&input(0, true, true, "")).unwrap()[2], 0x03);
    }

    #[test]
    fn test_long_label_truncated() {
        let frame = encode(&input(2, false, false, "CAMERA NUMBER 12345")).unwrap();
        assert_eq!(&frame[4..], b"CAMERA NUMBER ");
    }

    #[test]
    fn test_non_ascii_label_replaced() {
        assert_eq!(&wire_label("CAMÉRA\t1"), b"CAM?RA?1      ");
    }

    #[test]
    fn test_decode_roundtrip_up_to_truncation() {
        let original = input(42, false, true, "WIDE SHOT LEFT SIDE");
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded.address(), 42);
        assert!(!decoded.program());
        assert!(decoded.preview());
        assert_eq!(decoded.label(), "WIDE SHOT LEFT");
    }

    #[test]
    fn test_decode_trims_padding() {
        let mut frame = encode(&input(3, true, true, "PTZ")).unwrap();
        frame[10] = 0;
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.label(), "PTZ");
        assert!(decoded.program() && decoded.preview());
    }

    #[test]
    fn test_decode_stops_at_nul() {
        let mut frame = encode(&input(7, false, false, "AB CD")).unwrap();
        frame[6] = 0;
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.label(), "AB");
        assert_eq!(decode(&encode(&decoded).unwrap()).unwrap(), decoded);

        frame[4] = 0x07;
        assert_eq!(decode(&frame).unwrap().label(), "?B");
    }

    #[test]
    fn test_decode_ignores_extra_control_bits() {
        let mut frame = encode(&input(3, false, false, "A")).unwrap();
        frame[2] = 0x31;
        let decoded = decode(&frame).unwrap();
        assert!(decoded.program());
        assert!(!decoded.preview());
    }

    #[test]
    fn test_decode_malformed() {
        let frame = encode(&input(1, false, false, "A")).unwrap();
        assert!(matches!(decode(&frame[..17]), Err(TslError::MalformedFrame(_))));

        let mut bad_header = frame;
        bad_header[0] = 0x81;
        assert!(matches!(decode(&bad_header), Err(TslError::MalformedFrame(_))));

        let mut bad_address = frame;
        bad_address[1] = 127;
        assert!(matches!(decode(&bad_address), Err(TslError::MalformedFrame(_))));
    }
}
