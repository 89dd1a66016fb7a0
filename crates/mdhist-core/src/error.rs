use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Invalid snapshot id: {0}")]
    InvalidSnapshotId(String),

    #[error("Checkpoint label cannot be empty")]
    InvalidLabel,

    #[error("Compression error: {0}")]
    Compression(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
