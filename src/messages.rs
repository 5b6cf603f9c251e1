// items flowing from acquisition into the relay, and the frame the relay puts on the wire

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Maps sample indices onto frequencies. The three values always travel together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Hz, lower edge of the scanned band
    #[serde(rename = "ret-start-freq")]
    pub start_freq: f64,
    /// Hz covered by one sample
    #[serde(rename = "arr-bin-size")]
    pub bin_size: f64,
    #[serde(rename = "arr-size")]
    pub num_bins: usize,
}

impl Calibration {
    pub fn new(start_freq: f64, bin_size: f64, num_bins: usize) -> Calibration {
        Calibration { start_freq, bin_size, num_bins }
    }

    pub fn frequency_of(&self, index: usize) -> f64 {
        self.start_freq + self.bin_size * index as f64
    }

    pub fn stop_freq(&self) -> f64 {
        self.frequency_of(self.num_bins)
    }
}

/// One raw spectrum snapshot. `samples.len()` always equals `calibration.num_bins`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    calibration: Calibration,
    samples: Vec<f64>,
}

impl SpectrumFrame {
    pub fn new(calibration: Calibration, samples: Vec<f64>) -> Result<SpectrumFrame> {
        if samples.len() != calibration.num_bins {
            return Err(Error::Protocol(format!(
                "snapshot has {} samples but calibration says {}",
                samples.len(),
                calibration.num_bins
            )));
        }
        Ok(SpectrumFrame { calibration, samples })
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_parts(self) -> (Calibration, Vec<f64>) {
        (self.calibration, self.samples)
    }
}

/// What the acquisition side is allowed to put on the inbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Calibration(Calibration),
    Data(SpectrumFrame),
}

// dict-shaped messages as emitted by the acquisition process
#[derive(Deserialize)]
#[serde(untagged)]
enum RawItem {
    Data { data: RawData, info: Calibration },
    Settings { settings: Calibration },
}

#[derive(Deserialize)]
struct RawData {
    max: Vec<f64>,
}

impl QueueItem {
    /// Decide the item kind at the producer boundary.
    ///
    /// Accepts `{"settings": {..}}` and `{"data": {"max": [..]}, "info": {..}}`;
    /// anything else is a protocol violation.
    pub fn from_json(value: Value) -> Result<QueueItem> {
        let raw: RawItem = serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("unrecognized queue item: {e}")))?;
        match raw {
            RawItem::Settings { settings } => Ok(QueueItem::Calibration(settings)),
            RawItem::Data { data, info } => Ok(QueueItem::Data(SpectrumFrame::new(info, data.max)?)),
        }
    }

    pub fn calibration(&self) -> Calibration {
        match self {
            QueueItem::Calibration(cal) => *cal,
            QueueItem::Data(frame) => frame.calibration(),
        }
    }
}

/// An averaged spectrum plus the calibration it was taken with. This is the
/// payload between the envelope markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateFrame {
    pub start_freq: f64,
    pub num_bins: usize,
    pub bin_size: f64,
    pub data: Vec<f64>,
}

impl AggregateFrame {
    pub fn new(calibration: Calibration, data: Vec<f64>) -> AggregateFrame {
        AggregateFrame {
            start_freq: calibration.start_freq,
            num_bins: calibration.num_bins,
            bin_size: calibration.bin_size,
            data,
        }
    }

    pub fn calibration(&self) -> Calibration {
        Calibration::new(self.start_freq, self.bin_size, self.num_bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_item_is_calibration() {
        let item = QueueItem::from_json(json!({
            "settings": {"ret-start-freq": 9.0e8, "arr-bin-size": 500.0, "arr-size": 4}
        }))
        .expect("settings should parse");
        assert_eq!(item, QueueItem::Calibration(Calibration::new(9.0e8, 500.0, 4)));
    }

    #[test]
    fn data_item_carries_samples_and_calibration() {
        let item = QueueItem::from_json(json!({
            "data": {"max": [-80.0, -70.0]},
            "info": {"ret-start-freq": 1.0e6, "arr-bin-size": 10.0, "arr-size": 2}
        }))
        .expect("data should parse");
        match item {
            QueueItem::Data(frame) => {
                assert_eq!(frame.samples(), &[-80.0, -70.0]);
                assert_eq!(frame.calibration().num_bins, 2);
            }
            other => panic!("expected data item, got {other:?}"),
        }
    }

    #[test]
    fn unknown_shapes_are_protocol_violations() {
        let missing_info = json!({"data": {"max": [1.0]}});
        let nonsense = json!({"hello": "world"});
        let wrong_count = json!({
            "data": {"max": [1.0, 2.0, 3.0]},
            "info": {"ret-start-freq": 0.0, "arr-bin-size": 1.0, "arr-size": 2}
        });
        for value in [missing_info, nonsense, wrong_count] {
            assert!(matches!(QueueItem::from_json(value), Err(Error::Protocol(_))));
        }
    }

    #[test]
    fn frequency_mapping() {
        let cal = Calibration::new(100.0, 2.5, 8);
        assert_eq!(cal.frequency_of(0), 100.0);
        assert_eq!(cal.frequency_of(4), 110.0);
        assert_eq!(cal.stop_freq(), 120.0);
    }
}
