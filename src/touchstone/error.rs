use thiserror::Error;

#[derive(Error, Debug)]
pub enum TouchstoneError {
    #[error("Expected an option line starting with '#', got: {0}")]
    NotAnOptionLine(String),

    #[error("Illegal option line: {0}")]
    IllegalOption(String),

    #[error("Frequency not ascending: {0}")]
    NotAscending(String),

    #[error("Data values aren't pairs: {0}")]
    OddValues(String),

    #[error("Inconsistent number of pairs: {0}")]
    InconsistentPairs(String),

    #[error("More than 4 parameter pairs on line: {0}")]
    TooManyPairs(String),

    #[error("Couldn't parse '{value}' as a number on line: {line}")]
    BadNumber { value: String, line: String },

    #[error("File contains no option line")]
    MissingOptionLine,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
