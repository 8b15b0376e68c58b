use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{source_name} is not valid JSON: {source}")]
    Json {
        source_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{source_name} envelope rejected: {reason}")]
    UnexpectedEnvelope {
        source_name: &'static str,
        reason: String,
    },

    #[error("{file} CSV error: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("{file} is missing required columns: {missing:?}")]
    MissingColumns { file: String, missing: Vec<String> },

    #[error("{file} data row {line_index} invalid: {message}")]
    DataRow {
        file: String,
        line_index: usize,
        message: String,
    },
}

impl ParserError {
    /// Envelope problems mean "no data for this tenant" rather than a failure.
    pub fn is_envelope_rejection(&self) -> bool {
        matches!(self, ParserError::UnexpectedEnvelope { .. })
    }
}
