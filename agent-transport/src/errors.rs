use thiserror::Error;

/// Errors a caller of this crate needs to match on, as opposed to the `anyhow` context used
/// internally by the writer/reader/pinger tasks (spec.md §7).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not connect to report receiver {url} after {attempts} attempts")]
    DialExhausted { url: String, attempts: u32 },

    #[error("failed to send report: {0}")]
    SendFailed(String),
}
