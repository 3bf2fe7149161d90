use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be created, read or written, or is not
    /// syntactically valid.
    #[error("storage error on {file}: {source}")]
    Storage {
        file: String,
        #[source]
        source: BoxError,
    },

    /// Content is structurally present but semantically invalid.
    #[error("invalid data: {0}")]
    Format(String),

    #[error("no trigger with id {id} (have {len})")]
    NotFound { id: usize, len: usize },

    #[error("telemetry payload contains no logs")]
    NoData,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn storage(file: &str, source: impl Into<BoxError>) -> Self {
        StoreError::Storage {
            file: file.to_string(),
            source: source.into(),
        }
    }

    /// Classify a JSON failure for `file`: a file that is not JSON at all is
    /// a storage problem, a file with the wrong shape is a format problem.
    pub(crate) fn from_json(file: &str, err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Data => StoreError::Format(format!("{file}: {err}")),
            Category::Io | Category::Syntax | Category::Eof => StoreError::storage(file, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_is_storage() {
        let err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        assert!(matches!(
            StoreError::from_json("a.json", err),
            StoreError::Storage { .. }
        ));
    }

    #[test]
    fn truncated_file_is_storage() {
        let err = serde_json::from_str::<serde_json::Value>(r#"{"auto": tr"#).unwrap_err();
        assert!(matches!(
            StoreError::from_json("a.json", err),
            StoreError::Storage { .. }
        ));
    }

    #[test]
    fn wrong_type_is_format() {
        let err = serde_json::from_str::<Vec<u32>>(r#"["x"]"#).unwrap_err();
        let mapped = StoreError::from_json("a.json", err);
        match mapped {
            StoreError::Format(msg) => assert!(msg.starts_with("a.json:"), "got {msg}"),
            other => panic!("expected Format, got {other:?}"),
        }
    }

    #[test]
    fn not_found_message_names_id_and_len() {
        let msg = StoreError::NotFound { id: 4, len: 2 }.to_string();
        assert_eq!(msg, "no trigger with id 4 (have 2)");
    }
}
