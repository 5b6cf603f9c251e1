// the receiving end of the relay: reads envelopes off the socket and annotates them with peaks

use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{info, warn};

use crate::codec::EnvelopeScanner;
use crate::error::Result;
use crate::messages::AggregateFrame;
use crate::peaks::{self, PeakEntry, Peaks};

const READ_CHUNK: usize = 64 * 1024;

pub struct TelemetryClient {
    stream: TcpStream,
    addr: SocketAddr,
    scanner: EnvelopeScanner,
    buf: Vec<u8>,
}

impl TelemetryClient {
    pub fn connect<A: ToSocketAddrs>(addr: A, read_timeout: Option<Duration>) -> Result<TelemetryClient> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(read_timeout)?;
        TelemetryClient::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<TelemetryClient> {
        let addr = stream.peer_addr()?;
        info!("Connected to relay at {addr}");
        Ok(TelemetryClient {
            stream,
            addr,
            scanner: EnvelopeScanner::new(),
            buf: vec![0; READ_CHUNK],
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.addr
    }

    /// Blocks until a whole frame has arrived. `Ok(None)` once the relay has
    /// closed the connection. Envelopes that fail to decode are skipped.
    pub fn next_frame(&mut self) -> Result<Option<AggregateFrame>> {
        loop {
            while let Some(decoded) = self.scanner.next_frame() {
                match decoded {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => warn!("Skipping bad envelope from {}: {e}", self.addr),
                }
            }

            let read = self.stream.read(&mut self.buf)?;
            if read == 0 {
                info!("Relay {} closed the connection", self.addr);
                return Ok(None);
            }
            self.scanner.push(&self.buf[..read]);
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: AggregateFrame,
    pub peaks: Peaks,
}

impl AnnotatedFrame {
    /// Peaks are picked against `sensitivity` times the frame's own RMS
    /// deviation, so the threshold follows the noise floor.
    pub fn new(frame: AggregateFrame, sensitivity: f64) -> AnnotatedFrame {
        let peaks = peaks::annotate(&frame.data, sensitivity);
        AnnotatedFrame { frame, peaks }
    }

    /// e.g. " 915.125 MHz,  -20.1 dB"
    pub fn label(&self, peak: &PeakEntry) -> String {
        let freq = self.frame.calibration().frequency_of(peak.index);
        format!(" {:0.3} MHz,  {:0.1} dB", freq / 1_000_000.0, peak.value)
    }

    pub fn labels(&self) -> Vec<String> {
        self.peaks.maxima.iter().map(|p| self.label(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::messages::Calibration;
    use crate::peaks::DEFAULT_SENSITIVITY;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn carrier_frame() -> AggregateFrame {
        let mut data = vec![-95.0; 32];
        for (i, s) in data.iter_mut().enumerate() {
            *s += (i % 3) as f64 * 0.3;
        }
        data[12] = -30.0;
        AggregateFrame::new(Calibration::new(915_000_000.0, 12_500.0, 32), data)
    }

    #[test]
    fn labels_use_calibrated_frequency() {
        let annotated = AnnotatedFrame::new(carrier_frame(), DEFAULT_SENSITIVITY);
        assert_eq!(annotated.peaks.maxima.len(), 1);
        assert_eq!(annotated.labels(), vec![" 915.150 MHz,  -30.0 dB".to_string()]);
    }

    #[test]
    fn reads_frames_split_across_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let envelope = codec::encode(&carrier_frame()).unwrap();
            for chunk in envelope.chunks(5) {
                stream.write_all(chunk).unwrap();
            }
            stream.write_all(b"BEGIN_DATAnot jsonEND_DATA").unwrap();
            stream.write_all(&envelope).unwrap();
        });

        let mut client = TelemetryClient::connect(addr, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(client.next_frame().unwrap(), Some(carrier_frame()));
        // the garbage envelope is skipped
        assert_eq!(client.next_frame().unwrap(), Some(carrier_frame()));
        sender.join().unwrap();
        assert_eq!(client.next_frame().unwrap(), None);
    }
}
