use std::path::PathBuf;

use crate::models::ParticipantId;

/// Problems with the structure of a single CSV table.
#[derive(thiserror::Error, Debug)]
pub enum TableError {
    #[error("missing required column: {0}")]
    MissingColumn(String),
    #[error("CSV framing error")]
    Csv(#[from] csv::Error),
}

/// Fatal pipeline errors. Cell-level parse failures, unmatched meals and
/// demographic join misses are not errors: they surface as `None` values.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("cannot read {} input {}", describe(.participant), .path.display())]
    MissingInput {
        participant: Option<ParticipantId>,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed input {}", .path.display())]
    MalformedInput {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to write output {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[allow(clippy::ref_option)]
fn describe(participant: &Option<ParticipantId>) -> String {
    match participant {
        Some(id) => format!("participant {id}"),
        None => "shared".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_message_names_participant() {
        let err = PipelineError::MissingInput {
            participant: Some(7),
            path: PathBuf::from("Dexcom_007.csv"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let msg = err.to_string();
        assert!(msg.contains("participant 7"));
        assert!(msg.contains("Dexcom_007.csv"));
    }

    #[test]
    fn test_missing_shared_input_message() {
        let err = PipelineError::MissingInput {
            participant: None,
            path: PathBuf::from("Demographics.csv"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("cannot read shared input"));
    }
}
