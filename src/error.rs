use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Parse error: {field} field is not a number: {value:?}")]
    Parse { field: &'static str, value: String },

    #[error("Units error: {0}")]
    Units(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipe error: {0}")]
    Pipe(String),
}

impl Error {
    pub(crate) fn parse(field: &'static str, value: &str) -> Self {
        Error::Parse {
            field,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
