//! Errors raised below the service layer: storage bootstrap, configuration
//! parsing and stored-value decoding.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Creating the database directory or reading a config file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// A text value that does not name any known variant
    #[error("unknown {field} '{value}' (expected {expected})")]
    UnknownValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}
