//! Error types for stage tracing.

use thiserror::Error;

/// Result type alias for tracer operations.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Longest slice of offending input kept in a [`TraceError::Merge`].
const INPUT_PREVIEW_BYTES: usize = 256;

/// Errors surfaced by encoding, decoding, merging and writing traces.
///
/// Recording never fails; only the byte-level paths do.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A recorded value could not be represented in the wire format.
    #[error("Encoding error: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Input bytes were not a valid encoded stage sequence.
    #[error("Decoding error: {0}")]
    Decoding(#[source] serde_json::Error),

    /// Bytes handed to `merge_bytes` were not a valid encoded stage sequence.
    #[error("input [{input}] is not a valid stage trace: {source}")]
    Merge {
        /// Lossy, truncated rendering of the rejected bytes.
        input: String,
        #[source]
        source: serde_json::Error,
    },

    /// IO error from the trace writer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// Wrap a decode failure with a preview of the input that caused it.
    pub(crate) fn merge(data: &[u8], source: serde_json::Error) -> Self {
        TraceError::Merge {
            input: input_preview(data),
            source,
        }
    }

    /// True for any failure to decode a stage sequence, including merges.
    pub fn is_decoding(&self) -> bool {
        matches!(self, TraceError::Decoding(_) | TraceError::Merge { .. })
    }
}

fn input_preview(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if text.len() <= INPUT_PREVIEW_BYTES {
        return text.into_owned();
    }

    let mut end = INPUT_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
