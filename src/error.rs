// error taxonomy shared by the relay, the codec and the renderer-side client

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller broke a precondition (e.g. a non-positive peak threshold)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Envelope markers missing or out of order
    #[error("framing error: {0}")]
    Framing(&'static str),

    /// Queue item that is neither a calibration update nor a data frame
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// JSON has no representation for NaN/inf
    #[error("sample {index} is not finite ({value})")]
    NonFiniteSample { index: usize, value: f64 },

    /// An aggregate was ready before any calibration was seen
    #[error("no calibration received yet")]
    MissingCalibration,

    /// An aggregate was ready while no client was held
    #[error("no client connected")]
    NotConnected,

    #[error("send timed out")]
    Timeout,

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether a failed transmission means the client is gone.
    ///
    /// Timeouts, short writes and internal-state failures keep the client;
    /// the next aggregate goes out normally.
    pub fn drops_client(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
