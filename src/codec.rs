// BEGIN_DATA <json payload> END_DATA envelopes, no length prefix

use crate::error::{Error, Result};
use crate::messages::AggregateFrame;

pub const BEGIN_MARKER: &[u8] = b"BEGIN_DATA";
pub const END_MARKER: &[u8] = b"END_DATA";

// anything bigger than this without an END_DATA is garbage
const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

pub fn encode(frame: &AggregateFrame) -> Result<Vec<u8>> {
    if let Some((index, &value)) = frame.data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(Error::NonFiniteSample { index, value });
    }
    let payload = serde_json::to_vec(frame)?;

    let mut envelope = Vec::with_capacity(BEGIN_MARKER.len() + payload.len() + END_MARKER.len());
    envelope.extend_from_slice(BEGIN_MARKER);
    envelope.extend_from_slice(&payload);
    envelope.extend_from_slice(END_MARKER);
    Ok(envelope)
}

pub fn decode(bytes: &[u8]) -> Result<AggregateFrame> {
    let begin = find(bytes, BEGIN_MARKER).ok_or(Error::Framing("missing BEGIN_DATA"))?;
    let payload_start = begin + BEGIN_MARKER.len();
    let end = match find(&bytes[payload_start..], END_MARKER) {
        Some(offset) => payload_start + offset,
        None if find(&bytes[..begin], END_MARKER).is_some() => {
            return Err(Error::Framing("END_DATA precedes BEGIN_DATA"))
        }
        None => return Err(Error::Framing("missing END_DATA")),
    };
    Ok(serde_json::from_slice(&bytes[payload_start..end])?)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Recovers envelopes from a byte stream delivered in arbitrary chunks.
///
/// If an envelope was cut short (the sender gave up mid-write) the next
/// complete one is still found: the payload always starts after the last
/// BEGIN_DATA in front of the first END_DATA.
#[derive(Debug, Default)]
pub struct EnvelopeScanner {
    pending: Vec<u8>,
}

impl EnvelopeScanner {
    pub fn new() -> EnvelopeScanner {
        EnvelopeScanner::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING_BYTES && find(&self.pending, END_MARKER).is_none() {
            // keep a tail in case a marker straddles the cut
            let keep = BEGIN_MARKER.len().max(END_MARKER.len());
            let cut = self.pending.len() - keep;
            self.pending.drain(..cut);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Next complete frame, `None` until one has fully arrived.
    pub fn next_frame(&mut self) -> Option<Result<AggregateFrame>> {
        let end = find(&self.pending, END_MARKER)?;
        let consumed = end + END_MARKER.len();

        let result = match rfind(&self.pending[..end], BEGIN_MARKER) {
            Some(begin) => {
                serde_json::from_slice(&self.pending[begin + BEGIN_MARKER.len()..end]).map_err(Error::from)
            }
            None => Err(Error::Framing("END_DATA without BEGIN_DATA")),
        };
        self.pending.drain(..consumed);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Calibration;

    fn sample_frame() -> AggregateFrame {
        AggregateFrame::new(Calibration::new(915000000.0, 1000.0, 3), vec![-80.0, -75.5, -90.25])
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let frame = sample_frame();
        let bytes = encode(&frame).unwrap();
        assert!(bytes.starts_with(BEGIN_MARKER));
        assert!(bytes.ends_with(END_MARKER));

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.start_freq.to_bits(), frame.start_freq.to_bits());
        assert_eq!(decoded.bin_size.to_bits(), frame.bin_size.to_bits());
        assert_eq!(decoded.num_bins, 3);
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&decoded.data), bits(&frame.data));
    }

    #[test]
    fn awkward_floats_survive() {
        let frame = AggregateFrame::new(
            Calibration::new(2_400_000_000.123_456_7, 0.1 + 0.2, 3),
            vec![-93.33333333333333, 1e-300, -0.0],
        );
        let decoded = decode(&encode(&frame).unwrap()).unwrap();
        assert_eq!(decoded.bin_size.to_bits(), (0.1f64 + 0.2).to_bits());
        assert_eq!(decoded.data[0].to_bits(), frame.data[0].to_bits());
        assert_eq!(decoded.data[1].to_bits(), frame.data[1].to_bits());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn missing_end_marker() {
        let mut bytes = encode(&sample_frame()).unwrap();
        bytes.truncate(bytes.len() - END_MARKER.len());
        assert!(matches!(decode(&bytes), Err(Error::Framing(_))));
    }

    #[test]
    fn reversed_markers() {
        let bytes = b"END_DATA{\"startFreq\":1.0}BEGIN_DATA";
        assert!(matches!(decode(bytes), Err(Error::Framing(_))));
    }

    #[test]
    fn missing_begin_marker() {
        assert!(matches!(decode(b"{}END_DATA"), Err(Error::Framing(_))));
    }

    #[test]
    fn non_finite_samples_are_refused() {
        let frame = AggregateFrame::new(Calibration::new(0.0, 1.0, 2), vec![-10.0, f64::NEG_INFINITY]);
        assert!(matches!(encode(&frame), Err(Error::NonFiniteSample { index: 1, .. })));
    }

    #[test]
    fn scanner_reassembles_split_envelopes() {
        let first = encode(&sample_frame()).unwrap();
        let mut second_frame = sample_frame();
        second_frame.data = vec![1.0, 2.0, 3.0];
        let second = encode(&second_frame).unwrap();

        let stream: Vec<u8> = first.iter().chain(second.iter()).copied().collect();
        let mut scanner = EnvelopeScanner::new();
        let mut frames = Vec::new();
        for chunk in stream.chunks(7) {
            scanner.push(chunk);
            while let Some(frame) = scanner.next_frame() {
                frames.push(frame.unwrap());
            }
        }
        assert_eq!(frames, vec![sample_frame(), second_frame]);
        assert_eq!(scanner.pending_len(), 0);
    }

    #[test]
    fn scanner_resyncs_after_truncated_envelope() {
        let full = encode(&sample_frame()).unwrap();
        let mut scanner = EnvelopeScanner::new();
        scanner.push(&full[..full.len() / 2]);
        scanner.push(&full);

        let frame = scanner.next_frame().expect("a frame should be ready").unwrap();
        assert_eq!(frame, sample_frame());
        assert!(scanner.next_frame().is_none());
    }

    #[test]
    fn scanner_reports_orphan_end_marker() {
        let mut scanner = EnvelopeScanner::new();
        scanner.push(b"garbageEND_DATA");
        assert!(matches!(scanner.next_frame(), Some(Err(Error::Framing(_)))));
        assert_eq!(scanner.pending_len(), 0);
    }
}
