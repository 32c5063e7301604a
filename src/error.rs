use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetDatasetError {
    #[error("Source file not found: {0}")]
    SourceFileMissing(String),

    #[error("Unexpected column layout in {file}: expected {expected:?}, got {actual:?}")]
    ColumnContract {
        file: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Invalid field in {file}, row {row}: {details}")]
    InvalidField {
        file: String,
        row: usize,
        details: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BudgetDatasetError>;
