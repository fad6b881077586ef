//! Framer / FEC codec
//!
//! Encodes a payload chunk into a newline-terminated wire frame carrying a
//! checksum, optionally preceded by redundant copies for forward error
//! correction. Each frame is a sequence of records:
//!
//! ```text
//! ['^' checksum payload '\n']*N   redundant copies (FEC level N)
//!  '*' checksum payload '\n'      primary record
//! ```
//!
//! The checksum byte always lands in `0x80..=0xBF`, so it can never alias
//! the terminator or a record marker. A frame encoded with redundancy
//! level N survives corruption confined to N of its records: the decoder
//! recovers the payload from any intact record and reports how many were
//! corrupt.

use lasaurlink_core::{Error, ProtocolError, Result};

/// Maximum payload bytes per frame record (the classic G-code line limit).
pub const MAX_PAYLOAD: usize = 80;

/// Marker for the primary record of a frame.
pub const PRIMARY_MARKER: u8 = b'*';

/// Marker for a redundant copy record.
pub const REDUNDANT_MARKER: u8 = b'^';

const TERMINATOR: u8 = b'\n';

/// Forward error correction mode, selected per connection (or per send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum FecMode {
    /// Raw pass-through: payload + terminator, no checksum.
    Off,
    /// Checksum-only: the firmware can detect corruption but not fix it.
    /// The right default for a clean local USB link.
    #[default]
    Checksum,
    /// Checksum plus N redundant copies, at the cost of (N+1)x the wire
    /// bytes for the chunk. For noisy (e.g. wireless) links.
    Redundant(u8),
}

impl FecMode {
    /// Number of redundant copies this mode emits.
    pub fn copies(&self) -> usize {
        match self {
            FecMode::Off | FecMode::Checksum => 0,
            FecMode::Redundant(n) => *n as usize,
        }
    }
}

/// Outcome of decoding one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every record validated; payload is intact.
    Valid,
    /// Some records were corrupt but the payload was recovered from an
    /// intact one. Carries the number of corrupt records. A soft fault.
    Recovered(u32),
    /// No record validated; the payload is unrecoverable.
    ChecksumMismatch,
    /// Fewer bytes available than the frame needs; retain them and retry
    /// after more arrive.
    Incomplete,
}

/// An encoded wire frame. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
    payload_len: usize,
}

impl Frame {
    /// The bytes to hand to the transport.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, yielding its wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total wire size of the frame.
    pub fn wire_size(&self) -> usize {
        self.bytes.len()
    }

    /// Size of the payload carried by the frame.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }
}

/// Compute the LasaurGrbl line checksum.
///
/// Bytes at or below 0x20 and the control characters `~` and `!` are
/// excluded so that whitespace normalization and in-band control bytes on
/// the firmware side never perturb the sum.
pub fn checksum(payload: &[u8]) -> u8 {
    let mut sum: u32 = 0;
    for &c in payload {
        if c > b' ' && c != b'~' && c != b'!' {
            sum += c as u32;
            if sum >= 128 {
                sum -= 128;
            }
        }
    }
    ((sum >> 1) + 128) as u8
}

/// Encode one payload chunk into a frame.
///
/// Errors if the payload exceeds [`MAX_PAYLOAD`] (use [`encode_chunked`]
/// for larger payloads) or contains the frame terminator.
pub fn encode(payload: &[u8], mode: FecMode) -> Result<Frame> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::Protocol(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        }));
    }
    if payload.contains(&TERMINATOR) {
        return Err(Error::Protocol(ProtocolError::PayloadContainsTerminator));
    }

    let mut bytes = Vec::with_capacity((payload.len() + 3) * (mode.copies() + 1));
    match mode {
        FecMode::Off => {
            bytes.extend_from_slice(payload);
            bytes.push(TERMINATOR);
        }
        FecMode::Checksum | FecMode::Redundant(_) => {
            let ck = checksum(payload);
            for _ in 0..mode.copies() {
                bytes.push(REDUNDANT_MARKER);
                bytes.push(ck);
                bytes.extend_from_slice(payload);
                bytes.push(TERMINATOR);
            }
            bytes.push(PRIMARY_MARKER);
            bytes.push(ck);
            bytes.extend_from_slice(payload);
            bytes.push(TERMINATOR);
        }
    }

    Ok(Frame {
        bytes,
        payload_len: payload.len(),
    })
}

/// Split an arbitrarily long payload into [`MAX_PAYLOAD`]-sized chunks and
/// encode each as its own frame. The receiver reassembles by concatenating
/// decoded payloads in arrival order.
pub fn encode_chunked(payload: &[u8], mode: FecMode) -> Result<Vec<Frame>> {
    if payload.is_empty() {
        return Ok(vec![encode(payload, mode)?]);
    }
    payload
        .chunks(MAX_PAYLOAD)
        .map(|chunk| encode(chunk, mode))
        .collect()
}

/// One parsed record of a frame.
struct Record<'a> {
    redundant: bool,
    payload: Option<&'a [u8]>,
}

fn validate(line: &[u8]) -> Option<&[u8]> {
    if line.len() < 2 {
        return None;
    }
    let declared = line[1];
    let payload = &line[2..];
    (checksum(payload) == declared).then_some(payload)
}

/// Checksum bytes always fall in this range, so an unmarked line whose
/// second byte lands here is a marked record with a corrupted marker, not
/// raw G-code (which is plain ASCII).
fn looks_mangled(line: &[u8]) -> bool {
    line.len() >= 2 && (0x80..=0xBF).contains(&line[1])
}

/// A marker flip leaves the rest of the record intact, so a mangled line
/// opens a redundant frame only when the record right after it is marked
/// and carries the same checksum and payload bytes.
fn is_sibling_record(line: &[u8], next: Option<&[u8]>) -> bool {
    let Some(next) = next else {
        return false;
    };
    matches!(
        next.first(),
        Some(&REDUNDANT_MARKER) | Some(&PRIMARY_MARKER)
    ) && next.len() == line.len()
        && next[1..] == line[1..]
}

fn parse_record<'a>(
    line: &'a [u8],
    copies_pending: bool,
    next_line: Option<&[u8]>,
) -> Option<Record<'a>> {
    match line.first() {
        Some(&REDUNDANT_MARKER) => Some(Record {
            redundant: true,
            payload: validate(line),
        }),
        Some(&PRIMARY_MARKER) => Some(Record {
            redundant: false,
            payload: validate(line),
        }),
        _ if copies_pending => {
            // A record with a corrupted marker after redundant copies;
            // treat it as the (corrupt) primary, ending the frame.
            Some(Record {
                redundant: false,
                payload: None,
            })
        }
        _ if looks_mangled(line) => {
            if is_sibling_record(line, next_line) {
                // A leading redundant copy whose marker was corrupted;
                // keep scanning for the primary.
                Some(Record {
                    redundant: true,
                    payload: None,
                })
            } else {
                // A lone record with a corrupted marker: a corrupt
                // checksum-only frame, not the start of a redundant one.
                // Ends the frame so a frame behind it is never swallowed.
                Some(Record {
                    redundant: false,
                    payload: None,
                })
            }
        }
        _ => None, // Raw line, handled by the caller.
    }
}

/// Decode one frame from the front of `buf`.
///
/// On success the frame's bytes are consumed from `buf`; on
/// [`Outcome::Incomplete`] the buffer is left untouched so the caller can
/// retry once more bytes arrive. Unmarked lines (FEC off on the sender)
/// pass through as valid payloads.
pub fn decode(buf: &mut Vec<u8>) -> (Vec<u8>, Outcome) {
    let mut pos = 0;
    let mut corrupt: u32 = 0;
    let mut payload: Option<Vec<u8>> = None;
    let mut primary_valid = false;

    loop {
        let Some(nl) = buf[pos..].iter().position(|&b| b == TERMINATOR) else {
            return (Vec::new(), Outcome::Incomplete);
        };
        let line = &buf[pos..pos + nl];
        let rest = &buf[pos + nl + 1..];
        let next_line = rest
            .iter()
            .position(|&b| b == TERMINATOR)
            .map(|n| &rest[..n]);

        let record = match parse_record(line, pos > 0, next_line) {
            Some(record) => record,
            None => {
                // Raw pass-through line.
                let raw = line.to_vec();
                buf.drain(..pos + nl + 1);
                return (raw, Outcome::Valid);
            }
        };

        match record.payload {
            Some(p) => {
                if payload.is_none() {
                    payload = Some(p.to_vec());
                }
                if !record.redundant {
                    primary_valid = true;
                }
            }
            None => corrupt += 1,
        }

        if !record.redundant {
            buf.drain(..pos + nl + 1);
            break;
        }
        pos += nl + 1;
    }

    match payload {
        Some(p) if corrupt == 0 && primary_valid => (p, Outcome::Valid),
        Some(p) => (p, Outcome::Recovered(corrupt)),
        None => (Vec::new(), Outcome::ChecksumMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_range_is_marker_safe() {
        for payload in [&b""[..], b"G0 X10", b"M3", b"~!  control", b"\x7f\x7f"] {
            let ck = checksum(payload);
            assert!((0x80..=0xBF).contains(&ck), "ck {:#04x}", ck);
        }
    }

    #[test]
    fn checksum_ignores_whitespace_and_control() {
        assert_eq!(checksum(b"G0X10"), checksum(b"G0 X10"));
        assert_eq!(checksum(b"G0X10"), checksum(b"G0X10~!"));
    }

    #[test]
    fn roundtrip_off() {
        let frame = encode(b"G0 X10", FecMode::Off).unwrap();
        assert_eq!(frame.as_bytes(), b"G0 X10\n");
        let mut buf = frame.into_bytes();
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::Valid);
        assert_eq!(payload, b"G0 X10");
        assert!(buf.is_empty());
    }

    #[test]
    fn roundtrip_checksum() {
        let frame = encode(b"G0 X10", FecMode::Checksum).unwrap();
        let mut buf = frame.into_bytes();
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::Valid);
        assert_eq!(payload, b"G0 X10");
        assert!(buf.is_empty());
    }

    #[test]
    fn roundtrip_redundant() {
        for n in 1..=3u8 {
            let frame = encode(b"G1 Y42.5 F800", FecMode::Redundant(n)).unwrap();
            assert_eq!(frame.wire_size(), (13 + 3) * (n as usize + 1));
            let mut buf = frame.into_bytes();
            let (payload, outcome) = decode(&mut buf);
            assert_eq!(outcome, Outcome::Valid);
            assert_eq!(payload, b"G1 Y42.5 F800");
        }
    }

    #[test]
    fn roundtrip_empty_payload() {
        let mut buf = encode(b"", FecMode::Checksum).unwrap().into_bytes();
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::Valid);
        assert!(payload.is_empty());
    }

    #[test]
    fn oversize_payload_rejected() {
        let payload = vec![b'G'; MAX_PAYLOAD + 1];
        assert!(encode(&payload, FecMode::Checksum).is_err());
    }

    #[test]
    fn terminator_in_payload_rejected() {
        assert!(encode(b"G0\nG1", FecMode::Checksum).is_err());
    }

    #[test]
    fn chunked_reassembles_by_concatenation() {
        let payload: Vec<u8> = (0..200).map(|i| b'A' + (i % 26) as u8).collect();
        let frames = encode_chunked(&payload, FecMode::Checksum).unwrap();
        assert_eq!(frames.len(), 3);

        let mut buf: Vec<u8> = frames.into_iter().flat_map(Frame::into_bytes).collect();
        let mut reassembled = Vec::new();
        while !buf.is_empty() {
            let (chunk, outcome) = decode(&mut buf);
            assert_eq!(outcome, Outcome::Valid);
            reassembled.extend_from_slice(&chunk);
        }
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn incomplete_frame_retains_bytes() {
        let frame = encode(b"G0 X10", FecMode::Checksum).unwrap();
        let bytes = frame.into_bytes();

        // Everything but the terminator: decoder must not consume.
        let mut buf = bytes[..bytes.len() - 1].to_vec();
        let before = buf.clone();
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::Incomplete);
        assert!(payload.is_empty());
        assert_eq!(buf, before);

        // Completing the frame makes it decodable.
        buf.push(b'\n');
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::Valid);
        assert_eq!(payload, b"G0 X10");
    }

    #[test]
    fn corrupt_checksum_only_frame_is_a_mismatch() {
        let mut buf = encode(b"G0 X10", FecMode::Checksum).unwrap().into_bytes();
        buf[3] ^= 0x04; // flip a payload byte
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::ChecksumMismatch);
        assert!(payload.is_empty());
        assert!(buf.is_empty(), "corrupt frame is consumed, not retained");
    }

    #[test]
    fn corrupt_marker_on_checksum_only_frame_is_a_mismatch() {
        // A lone frame with its primary marker flipped must be reported
        // and consumed, not held back waiting for a phantom primary.
        let mut buf = encode(b"G0 X10", FecMode::Checksum).unwrap().into_bytes();
        buf[0] ^= 0x04;
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::ChecksumMismatch);
        assert!(payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn corrupt_marker_does_not_swallow_the_next_frame() {
        let mut buf = encode(b"G0 X10", FecMode::Checksum).unwrap().into_bytes();
        buf[0] ^= 0x04;
        buf.extend_from_slice(encode(b"M3", FecMode::Checksum).unwrap().as_bytes());

        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::ChecksumMismatch);
        assert!(payload.is_empty());

        // The frame behind the corrupt one decodes untouched.
        let (payload, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::Valid);
        assert_eq!(payload, b"M3");
        assert!(buf.is_empty());
    }

    #[test]
    fn single_flip_with_redundancy_recovers() {
        let original = b"G0 X10";
        let clean = encode(original, FecMode::Redundant(1)).unwrap().into_bytes();

        // Flip each payload/checksum byte position in turn; every flip must
        // still recover the original payload from the other record.
        for i in 0..clean.len() - 1 {
            let mut buf = clean.clone();
            if buf[i] == b'\n' {
                continue; // record structure itself, not record content
            }
            buf[i] ^= 0x04;
            if buf[i] == b'\n' {
                continue;
            }
            let (payload, outcome) = decode(&mut buf);
            match outcome {
                Outcome::Valid => assert_eq!(payload, original),
                Outcome::Recovered(n) => {
                    assert_eq!(payload, original);
                    assert_eq!(n, 1);
                }
                other => panic!("flip at {} gave {:?}", i, other),
            }
        }
    }

    #[test]
    fn corruption_beyond_bound_is_a_mismatch() {
        let mut buf = encode(b"G0 X10", FecMode::Redundant(1)).unwrap().into_bytes();
        // Corrupt the payload of both records.
        buf[3] ^= 0x04;
        let second = 3 + buf.len() / 2;
        buf[second] ^= 0x04;
        let (_, outcome) = decode(&mut buf);
        assert_eq!(outcome, Outcome::ChecksumMismatch);
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut buf = Vec::new();
        for line in ["G0 X10", "G0 Y10", "M3"] {
            buf.extend_from_slice(encode(line.as_bytes(), FecMode::Checksum).unwrap().as_bytes());
        }
        let mut decoded = Vec::new();
        while !buf.is_empty() {
            let (payload, outcome) = decode(&mut buf);
            assert_eq!(outcome, Outcome::Valid);
            decoded.push(String::from_utf8(payload).unwrap());
        }
        assert_eq!(decoded, vec!["G0 X10", "G0 Y10", "M3"]);
    }
}
