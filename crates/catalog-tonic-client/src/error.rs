use std::path::PathBuf;
use tonic::Status;

pub type Result<T> = core::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with a non-OK status.
    #[error("call failed: {}: {}", .0.code(), .0.message())]
    Status(#[from] Status),

    #[error("cannot connect: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("cannot read image {}: {source}", path.display())]
    ReadImage {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ClientError {
    /// The gRPC status, if the server produced one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }
}
