/// Result alias that carries the custom [`TempoOrbitError`] type.
pub type Result<T> = std::result::Result<T, TempoOrbitError>;

/// Common error type for the core crate.
///
/// Tempo estimation never surfaces these to its callers; they only escape
/// from the plumbing around it (configuration files, decoding, FFT planning
/// and shared engine handles).
#[derive(Debug, thiserror::Error)]
pub enum TempoOrbitError {
    /// Free-form message used by collaborators such as PCM sources.
    #[error("{0}")]
    Message(String),
    /// Input that cannot be analysed at all.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Configuration that failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Failure reported by a PCM source while decoding.
    #[error("decode failed: {0}")]
    Decode(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("spectrum analysis failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl TempoOrbitError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TempoOrbitError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TempoOrbitError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
