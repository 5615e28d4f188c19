use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("area names must not be empty")]
    EmptyAreaName,
    #[error("unknown timezone `{0}`")]
    InvalidTimezone(String),
}
