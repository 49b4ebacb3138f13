use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] serde_json::Error),

    #[error("Directive error: {0}")]
    Directive(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}
